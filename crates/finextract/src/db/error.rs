use std::path::PathBuf;
use thiserror::Error;

/// Failures of the SQLite store adapter.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create database directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration v{version} ({name}) failed: {reason}")]
    Migration {
        version: u32,
        name: &'static str,
        reason: String,
    },

    /// Written by a newer finextract; refusing to guess at its layout.
    #[error("Database schema v{found} is newer than supported v{supported}")]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}
