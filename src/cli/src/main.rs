//! ocidist CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ocidist_cli::commands::{dispatch, Cli};
use ocidist_core::OciDistConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match OciDistConfig::load_or_default(cli.global.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // RUST_LOG wins, then --debug, then the configured level
    let default_filter = if cli.global.debug || config.debug {
        "debug"
    } else {
        config.log_level.as_filter()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli, config).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
