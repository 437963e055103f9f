//! WaterColorSite infrastructure CLI.

use clap::Parser;
use wcs_infra::cli::Cli;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("WCS_LOG"))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = wcs_infra::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
