//! `skiff version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("skiff version {}", skiff_core::VERSION);
    println!("user agent: {}", skiff_core::config::default_user_agent());
    Ok(())
}
