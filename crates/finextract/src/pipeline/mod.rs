pub mod context;
pub mod runner;

pub use context::PipelineContext;
pub use runner::Pipeline;
