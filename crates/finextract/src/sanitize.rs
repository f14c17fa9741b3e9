//! Helpers for keeping statement contents and directory layout out of logs.
//!
//! Uploaded statements usually sit under per-user paths and contain account
//! data, so span fields and log lines only ever carry file names.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}
