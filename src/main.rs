// Entry point: parses the command line and runs one pipeline stage.
use std::error::Error;

use clap::Parser;
use collusion::app;
use collusion::cli::Args;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    app::run(args)?;
    Ok(())
}
