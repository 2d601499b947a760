//! CLI command definitions and dispatch.

mod copy;
mod images;
mod inspect;
mod repos;
mod soci;
mod version;

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use ocidist_core::{ApiConfig, OciDistConfig};

/// ocidist - inspect, copy and sign OCI content in registries and layouts.
#[derive(Parser)]
#[command(name = "ocidist", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags accepted by every command.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Use https and verify registry certificates (true/false)
    #[arg(short = 'T', long, global = true, action = ArgAction::Set, value_name = "BOOL")]
    pub tls_verify: Option<bool>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to the config file (default: ~/.ocidist/config.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Print information about the OCI image at URL as JSON
    Inspect(inspect::InspectArgs),
    /// Print the image tags at URL
    Images(images::ImagesArgs),
    /// Print the repositories available at URL
    Repos(repos::ReposArgs),
    /// Copy an OCI image from one URL to another
    Copy(copy::CopyArgs),
    /// Manage signed OCI (SOCI) bundles
    Soci(soci::SociArgs),
    /// Show version information
    Version,
}

/// Effective settings: the config file with command-line overrides applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiConfig,
    pub product: String,
}

impl Settings {
    pub fn new(global: &GlobalArgs, config: &OciDistConfig) -> Self {
        Self {
            api: ApiConfig {
                tls_verify: global.tls_verify.unwrap_or(config.tls_verify),
                debug: global.debug || config.debug,
            },
            product: config.product.clone(),
        }
    }
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli, config: OciDistConfig) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::new(&cli.global, &config);
    tracing::debug!(
        tls_verify = settings.api.tls_verify,
        product = %settings.product,
        "Resolved settings"
    );

    match cli.command {
        Command::Inspect(args) => inspect::execute(args, &settings).await,
        Command::Images(args) => images::execute(args, &settings).await,
        Command::Repos(args) => repos::execute(args, &settings).await,
        Command::Copy(args) => copy::execute(args, &settings).await,
        Command::Soci(args) => soci::execute(args, &settings).await,
        Command::Version => version::execute().await,
    }
}
