//! `ocidist repos` command.

use clap::Args;
use ocidist_api::new_oci_api;

use super::Settings;

#[derive(Args)]
pub struct ReposArgs {
    /// Registry or layout URL, e.g. ocidist://localhost:5000
    pub url: String,
}

pub async fn execute(args: ReposArgs, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let api = new_oci_api(&args.url, settings.api)?;
    for repo in api.list_repositories().await? {
        println!(" {repo}");
    }
    Ok(())
}
