use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

const UTF8_BOM: char = '\u{FEFF}';

/// Read a module source file.
///
/// Invalid UTF-8 is replaced rather than rejected, and a leading byte-order
/// mark is dropped so it never reaches a transform pipeline.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_source(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.strip_prefix(UTF8_BOM).unwrap_or(&text).to_owned())
}

/// Write `bytes` to `path`, creating missing parent directories.
///
/// The data goes to a sibling temp file first and is renamed into place, so a
/// reader never observes a half-written module.
///
/// # Errors
/// Returns an error if a directory cannot be created or the write fails.
pub fn write_output(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("out");
    let staging = dir.join(format!(".{name}.{}.partial", std::process::id()));

    let mut file = File::create(&staging)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&staging, path) {
        if cfg!(windows) && path.exists() {
            fs::copy(&staging, path)?;
            let _ = fs::remove_file(&staging);
            return Ok(());
        }
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    Ok(())
}
