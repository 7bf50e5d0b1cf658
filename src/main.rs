// src/main.rs

use std::process::ExitCode;

use jobhost::{cli, logging, run};
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    match run_main().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("jobhost error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    info!(config = %args.config, version = env!("CARGO_PKG_VERSION"), "jobhost starting");
    run(args).await
}
