type Result<T> = color_eyre::eyre::Result<T>;

mod cli;

use clap::Parser;
use eyre::eyre;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Suite};
use sipconform::scenarios;
use sipconform::{ServerHarness, READY_PAYLOAD};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut failed = Vec::new();
    for suite in cli.suites() {
        info!(suite = suite.name(), "running conformance suite");
        match run_suite(&cli, suite).await {
            Ok(()) => info!(suite = suite.name(), "suite passed"),
            Err(e) => {
                error!(suite = suite.name(), "suite failed: {e:#}");
                failed.push(suite.name());
            }
        }
    }

    if failed.is_empty() {
        info!("all suites passed");
        Ok(())
    } else {
        Err(eyre!("failed suites: {}", failed.join(", ")))
    }
}

/// Starts one server, drives the suite's scenarios against it, and stops
/// it again. Teardown is owned by the harness, so the server goes away
/// even when a step fails.
async fn run_suite(cli: &Cli, suite: Suite) -> Result<()> {
    let config = cli.suite_config(suite);
    let mut harness = ServerHarness::start(config).await?;

    if harness.ready_payload() != READY_PAYLOAD {
        return Err(eyre!(
            "unexpected readiness payload: {:?}",
            harness.ready_payload()
        ));
    }

    let outcome = match suite {
        Suite::Basic => {
            let mut result = harness.run(&scenarios::options_probe(&cli.options_domain)?).await;
            if result.is_ok() {
                result = harness
                    .run(&scenarios::unknown_control_method("postMonitoringEvent")?)
                    .await;
            }
            result
        }
        Suite::RegisterCache => {
            harness
                .run(&scenarios::register_cache(&cli.register_cache_timing())?)
                .await
        }
    };

    let stopped = harness.shutdown().await;
    outcome?;
    stopped?;
    Ok(())
}
