//! `ocidist soci` commands - signed OCI bundles.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use ocidist_api::soci::{bundle_file_name, verify};
use ocidist_api::{
    new_oci_api, publish_bundle, NativeCrypto, SignedBundle, SociRef, UnsignedBundle,
    VerificationResult,
};

use super::Settings;

#[derive(Args)]
pub struct SociArgs {
    #[command(subcommand)]
    pub command: SociCommand,
}

#[derive(Subcommand)]
pub enum SociCommand {
    /// Inspect a SOCI image and verify its signature
    Inspect(InspectArgs),
    /// Print the bundle stored at URL
    Get(GetArgs),
    /// Publish a bundle file to URL
    Put(PutArgs),
    /// Sign an install file and write <NAME>.soci
    Bundle(BundleArgs),
}

#[derive(Args)]
pub struct InspectArgs {
    /// SOCI image URL
    pub url: String,

    /// Verify the SOCI cert is issued by this CA and still valid
    #[arg(short, long, value_name = "FILE")]
    pub ca_file: Option<PathBuf>,
}

#[derive(Args)]
pub struct GetArgs {
    /// SOCI image URL
    pub url: String,
}

#[derive(Args)]
pub struct PutArgs {
    /// Bundle file written by `ocidist soci bundle`
    pub bundle: PathBuf,

    /// Destination URL, e.g. ocidist://localhost:5000/product/services/svc:v1.2
    pub url: String,
}

#[derive(Args)]
pub struct BundleArgs {
    /// Bundle name; output goes to <NAME>.soci
    pub name: String,

    /// Install payload (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub install_file: PathBuf,

    /// Certificate holding the verification key (PEM)
    #[arg(short, long, value_name = "FILE")]
    pub pub_key: PathBuf,

    /// Private signing key (PEM)
    #[arg(short, long, value_name = "FILE")]
    pub sign_key: PathBuf,
}

pub async fn execute(args: SociArgs, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    match args.command {
        SociCommand::Inspect(args) => inspect(args, settings).await,
        SociCommand::Get(args) => get(args, settings).await,
        SociCommand::Put(args) => put(args, settings).await,
        SociCommand::Bundle(args) => bundle(args),
    }
}

async fn inspect(args: InspectArgs, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let api = new_oci_api(&args.url, settings.api)?;
    let soci = SociRef::resolve(api.as_ref(), &settings.product).await?;

    let verification = verify(&soci, api.as_ref(), &NativeCrypto, args.ca_file.as_deref())
        .await
        .unwrap_or_else(unverifiable);
    let info = soci.info(api.source_url(), Some(verification));

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

/// A bundle whose parts cannot be fetched is reported, not fatal.
fn unverifiable(err: ocidist_core::OciDistError) -> VerificationResult {
    tracing::debug!(error = %err, "SOCI verification could not run");
    VerificationResult::failed(format!("Verification Failed: {}", err), err.to_string())
}

async fn get(args: GetArgs, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let api = new_oci_api(&args.url, settings.api)?;
    let soci = SociRef::resolve(api.as_ref(), &settings.product).await?;
    let bundle = soci.get_bundle(api.as_ref()).await?;

    println!("{}", bundle.to_json()?);
    Ok(())
}

async fn put(args: PutArgs, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = SignedBundle::from_file(&args.bundle)?;
    let api = new_oci_api(&args.url, settings.api)?;

    publish_bundle(api.as_ref(), &bundle, &settings.product)
        .await
        .map_err(|e| format!("Failed to publish {} to '{}': {}", args.bundle.display(), args.url, e))?;

    println!("Published {} to {}", args.bundle.display(), args.url);
    Ok(())
}

fn bundle(args: BundleArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "Generating SOCI bundle '{}' with\n Install: {}\n PubKeyCrt: {}\n SignKey: {}",
        bundle_file_name(&args.name),
        args.install_file.display(),
        args.pub_key.display(),
        args.sign_key.display()
    );

    let path = PathBuf::from(bundle_file_name(&args.name));
    UnsignedBundle::from_files(&args.install_file, &args.pub_key)?
        .sign(&NativeCrypto, &args.sign_key)?
        .write_file(&path)?;

    println!("Wrote SOCI Bundle: {}", path.display());
    Ok(())
}
