#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use nodefetch_core::ExecutionMode;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nodefetch")]
#[command(author, version, about = "Fetch transformed modules for server or client execution", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Fetch a module: transformed code plus source map, or an externalize directive
    Fetch {
        /// Module id (e.g. "/src/main.ts", "./src/main.ts", "node:fs")
        id: String,

        /// Execution mode: server (ssr) or client (web). Derived from the id if omitted.
        #[arg(long, short)]
        mode: Option<ExecutionMode>,

        /// Config file (defaults to nodefetch.json in the project root)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Write the code to a file instead of stdout
        #[arg(long, short = 'o', value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Resolve a specifier the way the fetcher would
    Resolve {
        /// Specifier to resolve (e.g. "./util", "react")
        specifier: String,

        /// Importing module id
        #[arg(long)]
        importer: Option<String>,

        /// Execution mode. Derived from the importer if omitted.
        #[arg(long, short)]
        mode: Option<ExecutionMode>,

        /// Config file (defaults to nodefetch.json in the project root)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Fetch a module and refetch it whenever project files change
    Watch {
        /// Module id
        id: String,

        /// Execution mode. Derived from the id if omitted.
        #[arg(long, short)]
        mode: Option<ExecutionMode>,

        /// Config file (defaults to nodefetch.json in the project root)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    // Version output is plain and never logged.
    if matches!(cli.command, Commands::Version) {
        return commands::version::run(cli.json);
    }

    logging::init(cli.verbose, cli.json);

    match cli.command {
        Commands::Version => Ok(()),
        Commands::Fetch {
            id,
            mode,
            config,
            out,
        } => commands::fetch::run(&cwd, &id, mode, config.as_deref(), out.as_deref(), cli.json),
        Commands::Resolve {
            specifier,
            importer,
            mode,
            config,
        } => commands::resolve::run(
            &cwd,
            &specifier,
            importer.as_deref(),
            mode,
            config.as_deref(),
            cli.json,
        ),
        Commands::Watch { id, mode, config } => {
            commands::watch::run(&cwd, &id, mode, config.as_deref(), cli.json)
        }
    }
}
