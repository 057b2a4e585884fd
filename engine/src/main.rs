// Sonar code-research agent
// Main entry point for the sonar binary

use clap::Parser;
use sdk::errors::{EngineError, ErrorExt};
use sonar_engine::cli::Cli;
use sonar_engine::config::Config;
use sonar_engine::handlers::handle_ask;
use sonar_engine::telemetry::init_telemetry_with_level;
use std::process::ExitCode;

async fn run(cli: Cli) -> anyhow::Result<String> {
    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");
    tracing::info!("Sonar v{} ({} - {})", version, commit, timestamp);

    tracing::info!("Question: {}", cli.question);
    let report = handle_ask(&config, &cli.question).await?;
    Ok(report.answer)
}

fn report_error(err: &anyhow::Error) {
    eprintln!("Error: {}", err);

    let hint = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<EngineError>())
        .map(|e| e.user_hint());
    if let Some(hint) = hint {
        eprintln!("Hint: {}", hint);
    }

    eprintln!("\nCaused by: {:?}", err);
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    match run(cli).await {
        Ok(answer) => {
            println!("{}", answer);
            ExitCode::SUCCESS
        }
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}
