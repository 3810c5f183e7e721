//! archive-checksum CLI - Row-count validation of archived tables.

use archive_checksum::{
    handle_invocation, ArchiveRecordStore, ChecksumError, Config, FileArchiveStore,
    ReconciliationOrchestrator,
};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "archive-checksum")]
#[command(about = "Validate archived table row counts against their source databases")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate row counts of every table in an archive
    Validate {
        /// Archive identifier
        archive_id: String,
    },

    /// Handle an invocation event and print the response
    Invoke {
        /// Event JSON file, or "-" for stdin
        #[arg(default_value = "-")]
        event: PathBuf,
    },

    /// Show the validation ledger of an archive
    Status {
        /// Archive identifier
        archive_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, ChecksumError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(ChecksumError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Validate { archive_id } => {
            let orchestrator = ReconciliationOrchestrator::from_config(&config).await?;
            let summary = orchestrator.run(&archive_id).await?;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                println!("\nValidation completed!");
                println!("  Archive: {}", summary.archive_id);
                println!("  Run ID: {}", summary.run_id);
                println!("  Duration: {:.2}s", summary.duration_seconds);
                println!("  Matched: {}/{}", summary.matched(), summary.tables.len());
                let mismatched = summary.mismatched_tables();
                if !mismatched.is_empty() {
                    println!("  Mismatched tables: {:?}", mismatched);
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Invoke { event } => {
            let raw = read_event(&event)?;
            let event: serde_json::Value = serde_json::from_str(&raw)?;

            let orchestrator = ReconciliationOrchestrator::from_config(&config).await?;
            let response = handle_invocation(&orchestrator, &event).await;
            println!("{}", serde_json::to_string_pretty(&response)?);

            if response.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Status { archive_id } => {
            let store = FileArchiveStore::open(&config.ledger.path).await?;
            let record = store.get(&archive_id).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!(
                    "Archive {} ({} {}@{}:{})",
                    record.id,
                    record.database_engine,
                    record.database,
                    record.hostname,
                    record.port
                );
                println!(
                    "  {:<32} {:<10} {:>12} {:>12}  MATCH",
                    "TABLE", "STATE", "SOURCE", "ARCHIVE"
                );
                for detail in &record.table_details {
                    let v = &detail.checksum_validation;
                    println!(
                        "  {:<32} {:<10} {:>12} {:>12}  {}",
                        detail.table,
                        v.state.to_string(),
                        format_count(v.source_count),
                        format_count(v.s3_count),
                        if v.matched { "yes" } else { "no" }
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn read_event(path: &Path) -> Result<String, ChecksumError> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        Ok(raw)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn format_count(count: Option<i64>) -> String {
    count.map_or_else(|| "-".to_string(), |c| c.to_string())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries command output
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
