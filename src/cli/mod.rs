use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use airt::{Client, ProgressStatus, Table};

use crate::config::{
    Config, SERVER_URL_ENV, SERVICE_PASSWORD_ENV, SERVICE_TOKEN_ENV, SERVICE_USERNAME_ENV,
};
use crate::display;

mod api_keys;
mod models;
mod predictions;
mod users;

#[derive(Parser)]
#[command(name = "airt", version)]
#[command(about = "A CLI client for the airt machine learning service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Server URL (overrides config)
    #[arg(long, global = true, env = SERVER_URL_ENV)]
    pub server: Option<String>,

    /// Access token or API key (overrides the stored login)
    #[arg(long, global = true, env = SERVICE_TOKEN_ENV, hide_env_values = true)]
    pub token: Option<String>,

    /// Print debug logs
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the server and client versions
    Version,

    /// Authentication commands
    #[command(subcommand)]
    Auth(AuthCommands),

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Manage user accounts
    #[command(subcommand)]
    User(users::UserCommands),

    /// Manage API keys
    #[command(subcommand)]
    ApiKey(api_keys::ApiKeyCommands),

    /// Train and manage models
    #[command(subcommand)]
    Model(models::ModelCommands),

    /// Manage and export predictions
    #[command(subcommand)]
    Pred(predictions::PredCommands),
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Log in and store the access token in the OS keyring
    Login {
        /// Account username
        #[arg(short, long, env = SERVICE_USERNAME_ENV)]
        username: String,

        /// Account password
        #[arg(short, long, env = SERVICE_PASSWORD_ENV, hide_env_values = true)]
        password: String,

        /// Six-digit code from the authenticator app, if MFA is enabled
        #[arg(long)]
        otp: Option<String>,
    },
    /// Logout (remove the stored token)
    Logout,
    /// Show authentication status
    Status,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., server.url)
        key: String,
        /// Configuration value
        value: String,
    },
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Number of entries to skip
    #[arg(short, long, default_value_t = 0)]
    pub offset: u64,

    /// Maximum number of entries to return
    #[arg(short, long, default_value_t = 100)]
    pub limit: u64,
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Print each row with a template such as "{uuid}: {name}"
    #[arg(short, long)]
    pub format: Option<String>,

    /// Print only the identifiers
    #[arg(short, long)]
    pub quiet: bool,
}

impl OutputArgs {
    pub fn print(&self, mut table: Table, id_column: &str) {
        display::humanize_dates(&mut table, &["created"]);
        let quiet = self.quiet.then_some(id_column);
        print!("{}", display::render(&table, self.format.as_deref(), quiet));
    }
}

/// What every command needs to talk to the service.
pub struct Session {
    config: Config,
    server_url: String,
    token: Option<String>,
}

impl Session {
    /// Client without credentials, for calls that precede a login.
    pub fn client(&self) -> Result<Client> {
        Client::new(&self.server_url).context("Failed to create client")
    }

    /// Client carrying a token from, in order: `--token`/`AIRT_SERVICE_TOKEN`,
    /// the keyring, or a fresh login with `AIRT_SERVICE_USERNAME`/`AIRT_SERVICE_PASSWORD`.
    pub async fn authenticated(&self) -> Result<Client> {
        let client = self.client()?;

        if let Some(token) = &self.token {
            return Ok(client.with_token(token));
        }
        if let Some(token) = self.config.get_token()? {
            return Ok(client.with_token(token));
        }

        let username = std::env::var(SERVICE_USERNAME_ENV).ok();
        let password = std::env::var(SERVICE_PASSWORD_ENV).ok();
        match (username, password) {
            (Some(username), Some(password)) => {
                let mut client = client;
                client
                    .get_token(&username, &password, None)
                    .await
                    .context("Failed to log in")?;
                Ok(client)
            }
            _ => bail!(
                "Not authenticated. Run 'airt auth login', or set {} (or {} and {})",
                SERVICE_TOKEN_ENV,
                SERVICE_USERNAME_ENV,
                SERVICE_PASSWORD_ENV
            ),
        }
    }
}

/// First eight and last four characters of a token.
fn masked_token(token: &str) -> String {
    let head: String = token.chars().take(8).collect();
    let tail_len = token.chars().count().saturating_sub(8).min(4);
    let tail: String = token.chars().skip(token.chars().count() - tail_len).collect();
    format!("{}...{}", head, tail)
}

/// Follows a server-side job: a bare wait printing `id` when quiet, a
/// progress bar otherwise.
pub async fn follow(status: ProgressStatus, quiet: bool, id: &str, message: &str) -> Result<()> {
    if quiet {
        status.wait().await?;
        println!("{}", id);
    } else {
        println!("{}", message);
        status.progress_bar().await?;
    }
    Ok(())
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = Config::load()?;
        let server_url = config.resolve_server_url(self.server);
        let session = Session {
            config,
            server_url,
            token: self.token,
        };

        match self.command {
            Commands::Version => {
                let versions = session
                    .client()?
                    .version()
                    .await
                    .context("Failed to get the server version")?;
                for (component, version) in versions {
                    println!("{:<14}{}", component, version);
                }
            }
            Commands::Auth(cmd) => match cmd {
                AuthCommands::Login {
                    username,
                    password,
                    otp,
                } => {
                    let mut client = session.client()?;
                    let token = client
                        .get_token(&username, &password, otp.as_deref())
                        .await
                        .context("Failed to log in")?;
                    session.config.set_token(&token)?;
                    println!("{} Logged in to {}", "✓".green(), session.server_url);
                }
                AuthCommands::Logout => {
                    session.config.remove_token()?;
                    println!("{} Token removed", "✓".green());
                }
                AuthCommands::Status => match session.config.get_token()? {
                    Some(token) => {
                        println!("{} Authenticated", "✓".green());
                        println!("  Server: {}", session.server_url);
                        println!("  Token: {}", masked_token(&token));
                    }
                    None => {
                        println!("{} Not authenticated", "✗".red());
                        println!("  Run 'airt auth login --username <name>' to authenticate");
                    }
                },
            },
            Commands::Config(cmd) => match cmd {
                ConfigCommands::Set { key, value } => {
                    session.config.set(&key, &value)?;
                    println!("{} Configuration updated: {} = {}", "✓".green(), key, value);
                }
                ConfigCommands::Get { key } => match session.config.get(&key)? {
                    Some(val) => println!("{}", val),
                    None => println!("Configuration key '{}' not found", key),
                },
            },
            Commands::User(cmd) => users::run(cmd, &session).await?,
            Commands::ApiKey(cmd) => api_keys::run(cmd, &session).await?,
            Commands::Model(cmd) => models::run(cmd, &session).await?,
            Commands::Pred(cmd) => predictions::run(cmd, &session).await?,
        }

        Ok(())
    }
}
