//! `ocidist images` command.

use clap::Args;
use ocidist_api::{new_oci_api, OciApi, RepoType, RepositoryRef};
use ocidist_core::oci::sha256_digest;

use super::Settings;
use crate::output;

#[derive(Args)]
pub struct ImagesArgs {
    /// Repository URL, e.g. ocidist://localhost:5000/myrepo/myimage
    pub url: String,

    /// Print image tags only
    #[arg(short, long, conflicts_with = "long")]
    pub tags_only: bool,

    /// Show a table with the manifest digest and size of every tag
    #[arg(short, long)]
    pub long: bool,
}

pub async fn execute(args: ImagesArgs, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let api = new_oci_api(&args.url, settings.api)?;
    let tags = api.list_tags().await?;

    if args.long {
        return print_table(&args.url, api.as_ref(), &tags, settings).await;
    }

    let repo_path = api.repo_path();
    for tag in &tags {
        if args.tags_only {
            println!("{tag}");
        } else {
            println!("{}", image_line(repo_path, tag));
        }
    }
    Ok(())
}

/// `repoPath/tag`
fn image_line(repo_path: &str, tag: &str) -> String {
    format!("{}/{}", repo_path, tag)
}

/// URL addressing `tag` inside the repository named by `url`.
fn tag_url(reference: &RepositoryRef, tag: &str) -> String {
    match reference.repo_type() {
        RepoType::Registry => format!(
            "{}://{}/{}:{}",
            reference.scheme(),
            reference.authority(),
            reference.path(),
            tag
        ),
        RepoType::Layout => format!("{}://{}:{}", reference.scheme(), reference.layout_dir(), tag),
    }
}

async fn print_table(
    url: &str,
    api: &dyn OciApi,
    tags: &[String],
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let reference = RepositoryRef::parse(url)?;
    let mut table = output::new_table(&["REPOSITORY", "TAG", "DIGEST", "SIZE"]);

    for tag in tags {
        let tagged = new_oci_api(&tag_url(&reference, tag), settings.api)?;
        let (manifest, raw) = tagged.get_manifest().await?;
        let size = raw.len() as u64
            + manifest.config().size().max(0) as u64
            + manifest
                .layers()
                .iter()
                .map(|l| l.size().max(0) as u64)
                .sum::<u64>();

        table.add_row(vec![
            api.image_name(),
            tag.clone(),
            output::short_digest(&sha256_digest(&raw)),
            output::format_bytes(size),
        ]);
    }

    println!("{table}");
    Ok(())
}
