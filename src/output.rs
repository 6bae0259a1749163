//! Output formatting and JSON persistence.
//!
//! Responses go to stdout as JSON; state files (stats, directory snapshot)
//! are replaced whole so readers never see a partial write.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::PulseResult;

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty<T: std::fmt::Debug>(value: &T) {
    debug!("{:#?}", value);
}

/// Writes a value to stdout as one line of JSON, or indented when `pretty`.
pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> PulseResult<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if pretty {
        serde_json::to_writer_pretty(&mut out, value)?;
    } else {
        serde_json::to_writer(&mut out, value)?;
    }
    writeln!(out)?;
    Ok(())
}

/// Serializes `value` to `path`, replacing any previous content atomically.
///
/// Creates the parent directory if it does not already exist.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> PulseResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = temp_path_for(path);
    std::fs::write(&tmp, serde_json::to_vec(value)?)?;
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "JSON written");
    Ok(())
}

/// Sibling of `path` private to this process, so concurrent writers never
/// share a temp file.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", std::process::id()));
    PathBuf::from(tmp)
}
