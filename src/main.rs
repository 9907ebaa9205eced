use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use uuid::Uuid;

use covid_etl::config::Config;
use covid_etl::logging;
use covid_etl::observability::metrics;
use covid_etl::pipeline::tasks::{self, TransformOptions, TransformSummary};

#[derive(Parser)]
#[command(name = "covid_etl")]
#[command(about = "COVID-19 case data ETL: data.world to SQLite to cleaned CSV to S3")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "etl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the raw dataset to CSV
    Fetch,
    /// Preprocess the raw CSV and load it into the staging table
    Populate,
    /// Dump the staging table to CSV
    Extract,
    /// Clean the extracted CSV
    Transform {
        /// Leave placeholder coordinates unresolved
        #[arg(long)]
        skip_geocoding: bool,
        /// Input CSV (defaults to the extracted snapshot)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Output CSV (defaults to the transformed snapshot)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Upload the cleaned CSV to object storage
    Load,
    /// Run every stage in order
    Run {
        #[arg(long)]
        skip_geocoding: bool,
    },
}

fn print_transform(summary: &TransformSummary) {
    let report = &summary.report;
    println!("\n📊 Transform results:");
    println!("   Rows in: {}", report.initial_rows);
    println!("   Rows out: {}", report.final_rows);
    println!("   Duplicates dropped: {}", report.duplicates_dropped);
    println!("   Negative cases dropped: {}", report.missing.negative_dropped);
    if let Some(geo) = &report.geocode {
        println!(
            "   Geocoded: {}/{} ({} timed out)",
            geo.resolved, geo.candidates, geo.timed_out
        );
    }
    for issue in &report.assessment.issues {
        println!("   ⚠️  {}", issue.description);
    }
    println!("   Output file: {}", summary.output.display());
}

async fn dispatch(command: Commands, config: &Config, run_id: Uuid) -> anyhow::Result<()> {
    match command {
        Commands::Fetch => {
            let summary = tasks::fetch(config, run_id).await.context("fetch stage failed")?;
            println!("✅ Fetched {} rows ({} bytes)", summary.rows, summary.bytes);
        }
        Commands::Populate => {
            let summary = tasks::populate(config, run_id).await.context("populate stage failed")?;
            println!("✅ Inserted {} rows into '{}'", summary.rows_inserted, config.database.table);
        }
        Commands::Extract => {
            let rows = tasks::extract(config, run_id).await.context("extract stage failed")?;
            println!("✅ Extracted {} rows", rows);
        }
        Commands::Transform {
            skip_geocoding,
            input,
            output,
        } => {
            let summary = tasks::transform(
                config,
                run_id,
                TransformOptions {
                    skip_geocoding,
                    input,
                    output,
                },
            )
            .await
            .context("transform stage failed")?;
            print_transform(&summary);
        }
        Commands::Load => {
            let summary = tasks::load(config, run_id).await.context("load stage failed")?;
            println!("✅ Uploaded {} ({} bytes, sha256 {})", summary.uri, summary.bytes, summary.sha256);
        }
        Commands::Run { skip_geocoding } => {
            let summary = tasks::run_all(config, run_id, skip_geocoding)
                .await
                .context("pipeline run failed")?;
            println!("✅ Pipeline complete: {}", summary.uri);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = logging::init_logging(&config.paths.log_dir);
    let handle = metrics::init();

    let run_id = Uuid::new_v4();
    info!(%run_id, config = %cli.config.display(), "Starting covid_etl");

    let result = dispatch(cli.command, &config, run_id).await;

    if let Some(handle) = &handle {
        if let Err(e) = metrics::push(handle, &config.metrics).await {
            warn!("Failed to push metrics: {}", e);
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%run_id, "Run failed: {:#}", e);
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}
