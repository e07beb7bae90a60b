//! `skiff resolve` command.

use clap::Args;
use skiff_registry::{
    new_registry, new_registry_target, new_registry_with_discover, Descriptor, ImageReference,
    RegistryState, Resolver,
};

use super::RegistryArgs;
use crate::output::{format_bytes, new_table};

#[derive(Args)]
pub struct ResolveArgs {
    /// Reference to resolve (e.g., "alpine:latest", "ghcr.io/org/image:tag")
    pub reference: String,

    /// Probe the registry endpoint first; fail if it cannot be reached
    #[arg(long, conflicts_with = "target")]
    pub discover: bool,

    /// Resolve through a push-capable target scoped to the reference's host
    #[arg(long)]
    pub target: bool,

    /// Print the descriptor as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

pub async fn execute(args: ResolveArgs) -> Result<(), Box<dyn std::error::Error>> {
    let opts = args.registry.to_options()?;
    let reference = ImageReference::parse(&args.reference)?;

    let descriptor = if args.target {
        let target = new_registry_target(&args.reference, &opts)?;
        target.resolve(&reference).await?
    } else {
        let registry = if args.discover {
            new_registry_with_discover(&args.reference, &opts).await?
        } else {
            new_registry(&opts)?
        };
        if let RegistryState::DiscoveredResolverActive(endpoint) = registry.state() {
            tracing::info!(endpoint = %endpoint.base_url, "Using discovered endpoint");
        }
        registry.resolve(&reference).await?
    };

    print_descriptor(&reference, &descriptor, args.json)
}

fn print_descriptor(
    reference: &ImageReference,
    descriptor: &Descriptor,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(descriptor)?);
        return Ok(());
    }

    let mut table = new_table(&["REFERENCE", "MEDIA TYPE", "DIGEST", "SIZE"]);
    table.add_row(vec![
        reference.to_string(),
        descriptor.media_type.clone(),
        descriptor.digest.clone(),
        format_bytes(descriptor.size.max(0) as u64),
    ]);
    println!("{table}");
    Ok(())
}
