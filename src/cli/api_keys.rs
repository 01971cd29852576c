use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use airt::{ApiKey, Expiry};

use super::{ListArgs, OutputArgs, Session};

#[derive(Subcommand)]
pub enum ApiKeyCommands {
    /// Create a new API key
    Create {
        /// Key name, unique among your active keys
        name: String,

        /// Days until the key expires; without it the key never expires
        #[arg(short, long)]
        expiry: Option<i64>,

        #[arg(long)]
        otp: Option<String>,

        /// Print only the key
        #[arg(short, long)]
        quiet: bool,
    },

    /// List API keys
    Ls {
        /// uuid or username (super users only)
        #[arg(short, long)]
        user: Option<String>,

        #[command(flatten)]
        list: ListArgs,

        /// Include revoked keys
        #[arg(long)]
        include_disabled: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show details of an API key
    Details {
        /// Key uuid or name
        key: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Revoke one or more API keys
    Revoke {
        /// Key uuids or names
        #[arg(required = true)]
        keys: Vec<String>,

        /// uuid or username (super users only)
        #[arg(short, long)]
        user: Option<String>,

        #[arg(long)]
        otp: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

pub async fn run(cmd: ApiKeyCommands, session: &Session) -> Result<()> {
    let client = session.authenticated().await?;

    match cmd {
        ApiKeyCommands::Create {
            name,
            expiry,
            otp,
            quiet,
        } => {
            let token = ApiKey::create(&client, &name, expiry.map(Expiry::Days), otp.as_deref())
                .await
                .context("Failed to create API key")?;
            if quiet {
                println!("{}", token.access_token);
            } else {
                println!("{} API key '{}' created", "✓".green(), name);
                println!("  Key: {}", token.access_token);
                println!("  Use it with --token or the AIRT_SERVICE_TOKEN environment variable");
            }
        }
        ApiKeyCommands::Ls {
            user,
            list,
            include_disabled,
            output,
        } => {
            let keys = ApiKey::ls(
                &client,
                user.as_deref(),
                list.offset,
                list.limit,
                include_disabled,
            )
            .await
            .context("Failed to list API keys")?;
            output.print(ApiKey::as_table(&keys)?, "uuid");
        }
        ApiKeyCommands::Details { key, output } => {
            let table = ApiKey::details(&client, &key)
                .await
                .context("Failed to get API key details")?;
            output.print(table, "uuid");
        }
        ApiKeyCommands::Revoke {
            keys,
            user,
            otp,
            output,
        } => {
            let table = ApiKey::revoke(&client, keys.as_slice(), user.as_deref(), otp.as_deref())
                .await
                .context("Failed to revoke API keys")?;
            output.print(table, "uuid");
        }
    }

    Ok(())
}
