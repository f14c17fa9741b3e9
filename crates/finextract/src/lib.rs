pub mod batch;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod processor;
pub mod query;
pub mod sanitize;
pub mod service;
pub mod store;
pub mod summary;

pub use batch::{BatchJob, BatchOrchestrator, FileSpec, FileStatus, JobStatus};
pub use config::{load_config, Config};
pub use error::{
    BatchError, ConfigError, ErrorKind, FinextractError, ProcessError, Result, StoreError,
};
pub use extraction::{extract_securities, validate_isin, ExtractionStrategy, StructuralStrategy};
pub use model::{Document, ExtractionResult, FileType, SemanticType, Security, Table};
pub use pipeline::Pipeline;
pub use processor::{ParserHandle, ProcessorRegistry};
pub use query::{QueryAnswer, QueryCategory, QueryOutcome};
pub use service::{BatchOptions, DocumentService};
pub use store::ResultStore;
pub use summary::{summarize, PortfolioSummary};
