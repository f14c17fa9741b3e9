//! Test harness for isolated batch runs.
//!
//! The `TestHarness` owns a temporary upload directory and builds a
//! `DocumentService` over either store backend.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use finextract::batch::{FileProcessor, PipelineProcessor};
use finextract::config::{Config, StoreBackendKind};
use finextract::{DocumentService, FileSpec, Pipeline, ResultStore};

pub struct TestHarness {
    /// Keeps the directory alive for the harness' lifetime.
    temp_dir: TempDir,
    /// Where fixture files are written.
    pub upload_dir: PathBuf,
    pub config: Config,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let upload_dir = temp_dir.path().join("uploads");
        std::fs::create_dir_all(&upload_dir).expect("Failed to create upload dir");

        let mut config = Config::default();
        config.extraction.timeout_secs = 30;

        Self {
            temp_dir,
            upload_dir,
            config,
        }
    }

    /// Switch the configured store to a SQLite file inside the temp dir.
    pub fn with_sqlite_store(mut self) -> Self {
        self.config.store.backend = StoreBackendKind::Sqlite;
        self.config.store.path = Some(
            self.database_path()
                .to_string_lossy()
                .into_owned(),
        );
        self
    }

    pub fn database_path(&self) -> PathBuf {
        self.temp_dir.path().join("data").join("finextract.db")
    }

    /// Write a fixture under a stored name; returns its path.
    pub fn write_file(&self, stored_name: &str, contents: &[u8]) -> PathBuf {
        let path = self.upload_dir.join(stored_name);
        std::fs::write(&path, contents).expect("Failed to write fixture");
        path
    }

    /// Write a fixture under an opaque stored name and describe it by its
    /// original upload name, the way an upload endpoint would.
    pub fn upload(&self, original_name: &str, contents: &[u8]) -> FileSpec {
        let stored = format!("{}.upload", opaque_name(original_name));
        let path = self.write_file(&stored, contents);
        FileSpec::new(path, Some(original_name))
    }

    /// Service from the harness config, as production builds it.
    pub fn service(&self) -> DocumentService {
        DocumentService::from_config(&self.config).expect("Failed to build service")
    }

    /// Service over an in-memory store and a custom file processor.
    pub fn service_with(&self, processor: Arc<dyn FileProcessor>) -> DocumentService {
        DocumentService::with_parts(ResultStore::in_memory(), processor, &self.config)
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::from_config(&self.config.extraction)
    }

    pub fn pipeline_processor(&self) -> Arc<dyn FileProcessor> {
        Arc::new(PipelineProcessor::new(Arc::new(self.pipeline())))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn opaque_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
