//! `skiff logout` command: remove stored registry credentials.

use std::path::PathBuf;

use clap::Args;
use skiff_registry::CredentialStore;

#[derive(Args)]
pub struct LogoutArgs {
    /// Registry server (default: docker.io)
    pub server: Option<String>,

    /// Credential store file to edit (default: ~/.docker/config.json)
    #[arg(long = "config", value_name = "PATH")]
    pub configs: Vec<PathBuf>,
}

pub async fn execute(args: LogoutArgs) -> Result<(), Box<dyn std::error::Error>> {
    let server = args.server.unwrap_or_else(|| "docker.io".to_string());

    let store = CredentialStore::load(&args.configs)?;
    let removed = store.remove(&server)?;

    if removed {
        println!("Removing login credentials for {}", server);
    } else {
        println!("Not logged in to {}", server);
    }

    Ok(())
}
