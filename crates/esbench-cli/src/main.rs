//! esbench - benchmark CRUD and event-append workloads across backends.

mod args;
mod providers;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use esbench_core::{load_optional_provider, run_suite, BenchConfig, OperationProvider, ProviderLoad};

use crate::args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "esbench=info,esbench_core=info,esbench_backends=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "benchmark run failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run the suite. Returns whether every measured tier passed validation.
async fn run(args: Args) -> anyhow::Result<bool> {
    let config = BenchConfig::from(&args);
    let backend = args.backend.as_str();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backend,
        tiers = ?config.tiers.as_slice(),
        mode = %config.run_mode,
        "starting benchmark"
    );

    let load = load_optional_provider(backend, providers::strategies(&args)).await;
    let provider = match &load {
        ProviderLoad::Loaded(provider) => Some(provider.clone()),
        ProviderLoad::Unavailable { .. } => None,
    };

    let report = run_suite(load, &config).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.render());
    }

    if args.purge {
        if let Some(provider) = provider {
            let removed = provider.purge_synthetic().await?;
            tracing::info!(backend, removed, "removed synthetic aggregates");
        }
    }

    let success = report.is_success();
    if !success {
        tracing::warn!(backend, "benchmark validation failed");
    }
    Ok(success)
}
