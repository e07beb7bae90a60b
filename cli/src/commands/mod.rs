//! CLI command definitions and dispatch.

mod fetch;
mod login;
mod logout;
mod resolve;
mod version;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use skiff_core::RegistryOptions;

/// Skiff, a client for OCI registries.
#[derive(Parser)]
#[command(name = "skiff", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Resolve a reference to a descriptor
    Resolve(resolve::ResolveArgs),
    /// Fetch the manifest a reference points at
    Fetch(fetch::FetchArgs),
    /// Log in to a registry and store the credentials
    Login(login::LoginArgs),
    /// Remove stored registry credentials
    Logout(logout::LogoutArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Registry connection flags shared by every networked command.
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryArgs {
    /// Credential store file; repeat to layer several (earlier wins)
    #[arg(long = "config", value_name = "PATH")]
    pub configs: Vec<PathBuf>,

    /// Registry username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Registry password or identity token
    #[arg(short, long)]
    pub password: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Use plain HTTP instead of HTTPS
    #[arg(long)]
    pub plain_http: bool,

    /// User-Agent header to send
    #[arg(long)]
    pub user_agent: Option<String>,

    /// YAML file with registry options; flags override its values
    #[arg(long, value_name = "FILE")]
    pub options: Option<PathBuf>,
}

impl RegistryArgs {
    /// Merge the options file (if any) with the command-line flags.
    pub fn to_options(&self) -> skiff_core::Result<RegistryOptions> {
        let mut opts = match &self.options {
            Some(path) => RegistryOptions::from_file(path)?,
            None => RegistryOptions::default(),
        };

        if !self.configs.is_empty() {
            opts.configs = self.configs.clone();
        }
        if let Some(username) = &self.username {
            opts.username = username.clone();
        }
        if let Some(password) = &self.password {
            opts.password = password.clone();
        }
        if let Some(user_agent) = &self.user_agent {
            opts.user_agent = user_agent.clone();
        }
        opts.insecure |= self.insecure;
        opts.plain_http |= self.plain_http;

        Ok(opts)
    }
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Resolve(args) => resolve::execute(args).await,
        Command::Fetch(args) => fetch::execute(args).await,
        Command::Login(args) => login::execute(args).await,
        Command::Logout(args) => logout::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}
