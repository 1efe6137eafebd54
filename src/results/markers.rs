//! Verdict marker files.
//!
//! Wrapper tooling looks for an empty-ish `success` or `failed` file in the
//! results root. Exactly one of them exists after a CLI run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::info;

pub const SUCCESS_MARKER: &str = "success";
pub const FAILED_MARKER: &str = "failed";

/// Write the marker for `success` and remove the opposite one
pub fn write_verdict_markers(results_root: &Path, success: bool) -> io::Result<PathBuf> {
    let (keep, remove) = if success {
        (SUCCESS_MARKER, FAILED_MARKER)
    } else {
        (FAILED_MARKER, SUCCESS_MARKER)
    };

    fs::create_dir_all(results_root)?;
    match fs::remove_file(results_root.join(remove)) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let marker = results_root.join(keep);
    fs::write(&marker, format!("{}\n", Utc::now().to_rfc3339()))?;
    info!("Verdict: {}", marker.display());
    Ok(marker)
}
