//! `ocidist copy` command.

use clap::Args;
use ocidist_api::{image_copy, ImageCopyOpts};

use super::Settings;

#[derive(Args)]
pub struct CopyArgs {
    /// Source image URL (ocidist://, docker:// or oci://)
    pub src: String,

    /// Destination image URL (ocidist://, docker:// or oci://)
    pub dest: String,
}

pub async fn execute(args: CopyArgs, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let opts = ImageCopyOpts {
        src_skip_tls: !settings.api.tls_verify,
        dest_skip_tls: !settings.api.tls_verify,
        debug: settings.api.debug,
    };
    image_copy(&args.src, &args.dest, opts).await?;
    println!("OK");
    Ok(())
}
