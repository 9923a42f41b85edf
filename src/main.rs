// src/main.rs

use clap::Parser;

use jobdag::cli::Cli;
use jobdag::logging::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_level) {
        eprintln!("failed to initialise logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = jobdag::run(cli.command).await {
        tracing::error!(error = %e, "jobdag failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
