//! Configuration files as an operator would write them.

use std::io::Write;

use tempfile::NamedTempFile;

use finextract::config::StoreBackendKind;
use finextract::{load_config, ConfigError};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_sqlite_config() {
    let file = write_config(
        r#"{
            "version": "1.0",
            "store": { "backend": "sqlite", "path": "/tmp/finextract-test.db" },
            "extraction": { "timeout_secs": 45, "top_holdings": 3 },
            "batch": { "max_concurrent_jobs": 1 }
        }"#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.store.backend, StoreBackendKind::Sqlite);
    assert_eq!(config.extraction.timeout().as_secs(), 45);
    assert_eq!(config.extraction.top_holdings, 3);
    assert_eq!(config.batch.max_concurrent_jobs, 1);
}

#[test]
fn test_missing_file() {
    let result = load_config("/nonexistent/finextract.json");
    assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
}

#[test]
fn test_schema_violation() {
    let file = write_config(r#"{ "version": "1.0", "extraction": { "top_holdings": "five" } }"#);
    match load_config(file.path()) {
        Err(ConfigError::SchemaValidation { errors }) => assert!(!errors.is_empty()),
        other => panic!("Expected schema error, got {:?}", other),
    }
}
