use std::process::ExitCode;

use clap::Parser;
use mtl_broker::{Cli, StopFlag};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let stop = match StopFlag::register() {
        Ok(stop) => stop,
        Err(e) => {
            tracing::error!(error = %e, "failed to register signal handlers");
            return ExitCode::FAILURE;
        }
    };

    match mtl_broker::run(&cli, stop) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "broker failed to start");
            ExitCode::FAILURE
        }
    }
}
