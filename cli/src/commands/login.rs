//! `skiff login` command: verify and store registry credentials.

use std::io::BufRead;

use clap::Args;
use skiff_registry::{CredentialStore, LoginClient, LoginOptions};

use super::RegistryArgs;

/// Registry used when no server is given.
const DEFAULT_SERVER: &str = "docker.io";

/// Repository the credentials are checked against when none is given.
const DEFAULT_REPOSITORY: &str = "library/hello-world";

#[derive(Args)]
pub struct LoginArgs {
    /// Registry server (default: docker.io)
    pub server: Option<String>,

    /// Repository to authenticate against
    #[arg(long, default_value = DEFAULT_REPOSITORY)]
    pub repository: String,

    /// Read password from stdin
    #[arg(long, conflicts_with = "password")]
    pub password_stdin: bool,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

fn read_line(prompt: Option<&str>) -> std::io::Result<String> {
    if let Some(prompt) = prompt {
        eprint!("{prompt}");
    }
    let mut input = String::new();
    std::io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

pub async fn execute(args: LoginArgs) -> Result<(), Box<dyn std::error::Error>> {
    let server = args.server.unwrap_or_else(|| DEFAULT_SERVER.to_string());
    let opts = args.registry.to_options()?;

    let username = if opts.username.is_empty() {
        read_line(Some("Username: "))?
    } else {
        opts.username.clone()
    };

    let password = if args.password_stdin {
        read_line(None)?
    } else if opts.password.is_empty() {
        read_line(Some("Password: "))?
    } else {
        opts.password.clone()
    };

    if username.is_empty() || password.is_empty() {
        return Err("Username and password are required".into());
    }

    let mut login_opts = LoginOptions::new()
        .username(username.clone())
        .secret(password.clone())
        .user_agent(opts.effective_user_agent());
    if opts.insecure {
        login_opts = login_opts.insecure();
    }
    if opts.plain_http {
        login_opts = login_opts.plain_http();
    }

    let client = LoginClient::new(&server, &args.repository, &opts.configs, login_opts)?;
    client.login().await?;

    let store = CredentialStore::load(&opts.configs)?;
    store.store(&server, &username, &password)?;

    println!("Login Succeeded");
    Ok(())
}
