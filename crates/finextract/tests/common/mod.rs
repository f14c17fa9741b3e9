//! Common test utilities for finextract integration tests.
//!
//! This module provides:
//! - `builders`: fixture builders for PDF, XLSX and CSV statements
//! - `harness`: an isolated environment with a temp upload directory and a
//!   ready-to-use `DocumentService`

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
