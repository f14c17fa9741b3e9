use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use finextract::batch::{BatchJob, FileSpec};
use finextract::config::{load_config, Config};
use finextract::logging::init_tracing;
use finextract::service::{BatchOptions, DocumentService};

/// Extract text, tables, securities and a portfolio summary from financial
/// statements, then print the batch record as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file, or `-` for defaults
    config: String,

    /// PDF, XLSX/XLS or CSV files, processed in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Per-file timeout in seconds, overriding the config
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let job = match run(args).await {
        Ok(job) => job,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&job) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: failed to serialize batch: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if job.has_errors() || !job.status.is_terminal() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(args: Args) -> finextract::Result<BatchJob> {
    let config = if args.config == "-" {
        Config::default()
    } else {
        load_config(&args.config)?
    };

    init_tracing(&config.logging);

    let service = DocumentService::from_config(&config)?;

    let files = args
        .files
        .into_iter()
        .map(|path| FileSpec::new(path, None))
        .collect();
    let options = BatchOptions {
        timeout: args.timeout_secs.map(Duration::from_secs),
    };

    let batch_id = service.submit_batch(files, options)?;
    tracing::info!("Submitted batch {}", batch_id);

    Ok(service.wait_for_batch(&batch_id).await?)
}
