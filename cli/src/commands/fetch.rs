//! `skiff fetch` command.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use skiff_registry::{new_registry, new_registry_with_discover, ImageReference, Resolver};

use super::RegistryArgs;
use crate::output::{format_bytes, short_digest};

#[derive(Args)]
pub struct FetchArgs {
    /// Reference whose manifest to fetch
    pub reference: String,

    /// Write the content to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Probe the registry endpoint first; fail if it cannot be reached
    #[arg(long)]
    pub discover: bool,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

pub async fn execute(args: FetchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let opts = args.registry.to_options()?;
    let reference = ImageReference::parse(&args.reference)?;

    let registry = if args.discover {
        new_registry_with_discover(&args.reference, &opts).await?
    } else {
        new_registry(&opts)?
    };

    let descriptor = registry.resolve(&reference).await?;
    let content = registry
        .fetch(&reference.with_digest(&descriptor.digest), &descriptor)
        .await?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &content)?;
            eprintln!(
                "Fetched {} ({}) to {}",
                short_digest(&descriptor.digest),
                format_bytes(content.len() as u64),
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&content)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
