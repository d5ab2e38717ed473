mod cli;
mod config;
mod error;
mod model;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, FetchArgs};
use config::Config;
use model::batch::BatchReport;
use model::{
    ArtifactFetcher, ArtifactSpec, BundleLedger, BundleRecord, FetchOptions, HfHubClient, Manifest,
};
use std::process::ExitCode;

async fn fetch_all(config: &Config, specs: Vec<ArtifactSpec>, args: FetchArgs) -> anyhow::Result<ExitCode> {
    let client = HfHubClient::new(config)?;
    let fetcher = ArtifactFetcher::new(
        client,
        FetchOptions {
            convert_safetensors: args.convert_safetensors,
        },
    );

    let report = model::run_batch(&fetcher, specs, args.parallel).await?;

    Ok(if report_batch(config, &report) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Prints every outcome, then records successes in the ledger. Ledger
/// problems are logged and never mask the per-artifact report. Returns
/// whether every artifact was fetched.
fn report_batch(config: &Config, report: &BatchReport) -> bool {
    for bundle in report.successes() {
        println!("✓ Fetched {}", bundle.identifier);
        println!("  Revision: {}", bundle.revision);
        println!("  Path: {:?}", bundle.destination);
        println!("  Files: {}", bundle.files.join(", "));
    }

    for failure in report.failures() {
        eprintln!("✗ Failed {}", failure.spec.identifier);
        eprintln!("  Path: {:?}", failure.spec.destination_path);
        eprintln!("  Kind: {}", failure.kind());
        eprintln!("  Stage reached: {}", failure.stage);
        if failure.destination_untouched() {
            eprintln!("  Destination was left untouched.");
        } else {
            eprintln!("  Destination may hold a partial bundle.");
        }
        eprintln!("  Error: {}", failure.error);
        if failure.error.is_retryable() {
            eprintln!("  The registry was unreachable; re-running the fetch is safe.");
        }
    }

    let failed = report.failures().count();
    println!(
        "\n{} succeeded, {} failed",
        report.outcomes.len() - failed,
        failed
    );

    if let Err(e) = record_successes(config, report) {
        tracing::warn!("Could not update ledger at {:?}: {}", config.ledger_path, e);
    }

    report.all_succeeded()
}

fn record_successes(config: &Config, report: &BatchReport) -> error::Result<()> {
    if report.successes().next().is_none() {
        return Ok(());
    }

    let mut ledger = BundleLedger::load(config)?;
    for bundle in report.successes() {
        ledger.record(BundleRecord::from(bundle.clone()));
    }
    ledger.save(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Pull { artifacts, fetch } => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            let specs = artifacts
                .iter()
                .map(|arg| ArtifactSpec::parse(arg).map(|spec| spec.resolved_against(&cwd)))
                .collect::<error::Result<Vec<_>>>()?;

            fetch_all(&config, specs, fetch).await
        }

        Commands::Batch { manifest, fetch } => {
            let loaded = Manifest::load(&manifest)
                .with_context(|| format!("Failed to load manifest {:?}", manifest))?;
            tracing::info!("Manifest lists {} artifacts", loaded.artifacts.len());

            fetch_all(&config, loaded.artifacts, fetch).await
        }

        Commands::List => {
            let ledger = BundleLedger::load(&config)?;
            let bundles = ledger.list();

            if bundles.is_empty() {
                println!("No bundles fetched yet (data dir: {:?}).", config.data_dir);
                println!("Use 'hubstash pull <model-id>=<path>' to fetch one.");
            } else {
                println!("Fetched bundles (ledger: {:?}):\n", config.ledger_path);
                for bundle in bundles {
                    println!("  {}", bundle.identifier);
                    println!("    Revision: {}", bundle.revision);
                    println!("    Path: {:?}", bundle.destination);
                    println!("    Files: {}", bundle.files.len());
                    println!("    Size: {} bytes", bundle.total_bytes);
                    println!("    Fetched: {}", bundle.fetched_at);
                    println!();
                }
            }

            Ok(ExitCode::SUCCESS)
        }

        Commands::Verify { path, load_model } => {
            let report = model::verify::verify(&path, load_model)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
