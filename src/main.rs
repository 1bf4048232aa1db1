use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::Region;
use clap::Parser;

use ddbimport::backend::{DynamoDbBackend, DynamoDbConfig};
use ddbimport::{ImportConfig, ImportOrchestrator};

#[derive(Parser, Debug)]
#[command(
    name = "ddbimport",
    about = "Bulk import newline-delimited JSON records into an existing DynamoDB table"
)]
struct Args {
    /// AWS region.
    #[arg(short = 'r', long, default_value = "eu-central-1")]
    region: String,

    /// Existing DynamoDB table.
    #[arg(short = 't', long = "table")]
    table: Option<String>,

    /// Batches in flight at once (defaults to IMPORT_PARALLELISM or 10).
    #[arg(long, visible_alias = "parallelism")]
    amount: Option<usize>,

    /// Endpoint override, e.g. a local DynamoDB.
    #[arg(long)]
    endpoint: Option<String>,

    /// Pacing step in milliseconds; paced batches wait amount * step.
    #[arg(long)]
    throttle_step_ms: Option<u64>,

    /// Per-request timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the final summary as JSON.
    #[arg(long)]
    json: bool,

    /// Do not draw the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Newline-delimited JSON file to import.
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ddbimport::init_logger();

    let args = Args::parse();

    let (Some(table), Some(file)) = (args.table.clone(), args.file.clone()) else {
        let program = std::env::args().next().unwrap_or_else(|| "ddbimport".to_string());
        println!("Usage:\n\t{program} -t tableName \"path/to/file.json\"");
        return Ok(());
    };

    let mut config = ImportConfig::from_env(table);
    if let Some(amount) = args.amount {
        config.parallelism = amount;
    }
    if let Some(step) = args.throttle_step_ms {
        config.throttle_step = Duration::from_millis(step);
    }
    if args.no_progress {
        config.show_progress = false;
    }
    if let Err(err) = config.validate() {
        writeln!(io::stderr(), "error: {err}")?;
        std::process::exit(1);
    }

    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(args.region.clone()))
        .load()
        .await;
    let backend = DynamoDbBackend::new(
        &sdk_config,
        DynamoDbConfig {
            endpoint: args.endpoint.clone(),
            timeout_ms: args.timeout_ms,
        },
    );

    let orchestrator = ImportOrchestrator::new(Arc::new(backend), config);
    let summary = match orchestrator.import_file(&file).await {
        Ok(summary) => summary,
        Err(err) => {
            log::error!("import failed: {}", err);
            std::process::exit(1);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("{}", summary.message());
    }
    Ok(())
}
