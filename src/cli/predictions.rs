use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use airt::{ClickHouseProtocol, ClickHouseTarget, MySqlTarget, Prediction};

use super::{follow, ListArgs, OutputArgs, Session};
use crate::config::{
    AWS_ACCESS_KEY_ENV, AWS_SECRET_KEY_ENV, CLICKHOUSE_PASSWORD_ENV, CLICKHOUSE_USERNAME_ENV,
    CLIENT_DB_PASSWORD_ENV, CLIENT_DB_USERNAME_ENV,
};
use crate::display;

#[derive(Subcommand)]
pub enum PredCommands {
    /// List predictions
    Ls {
        #[command(flatten)]
        list: ListArgs,

        /// List only deleted predictions
        #[arg(long)]
        disabled: bool,

        /// List only predictions that finished successfully
        #[arg(long)]
        completed: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show details of a prediction
    Details {
        uuid: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Delete a prediction
    Rm {
        uuid: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print the prediction results, highest score first
    Results {
        uuid: String,

        /// Print each row with a template such as "{Score}"
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Download the prediction results to a local directory
    ToLocal {
        uuid: String,

        /// Existing local directory
        #[arg(long)]
        path: PathBuf,

        /// Hide the progress and print only the prediction uuid
        #[arg(short, long)]
        quiet: bool,
    },

    /// Push the prediction results to an AWS S3 bucket
    ToS3 {
        uuid: String,

        /// Target S3 bucket uri
        #[arg(long)]
        uri: String,

        #[arg(long, env = AWS_ACCESS_KEY_ENV, hide_env_values = true)]
        access_key: String,

        #[arg(long, env = AWS_SECRET_KEY_ENV, hide_env_values = true)]
        secret_key: String,

        /// Wait silently and print only the prediction uuid
        #[arg(short, long)]
        quiet: bool,
    },

    /// Push the prediction results to Azure Blob Storage
    ToAzureBlobStorage {
        uuid: String,

        /// Target Azure Blob Storage uri
        #[arg(long)]
        uri: String,

        /// Storage account credential
        #[arg(long)]
        credential: String,

        /// Wait silently and print only the prediction uuid
        #[arg(short, long)]
        quiet: bool,
    },

    /// Push the prediction results to a MySQL database
    ToMysql {
        uuid: String,

        /// Database host name
        #[arg(long)]
        host: String,

        /// Database name
        #[arg(long)]
        database: String,

        /// Table name
        #[arg(long)]
        table: String,

        #[arg(long, default_value_t = 3306)]
        port: u16,

        #[arg(long, env = CLIENT_DB_USERNAME_ENV, default_value = "root")]
        username: String,

        #[arg(long, env = CLIENT_DB_PASSWORD_ENV, default_value = "", hide_env_values = true)]
        password: String,

        /// Wait silently and print only the prediction uuid
        #[arg(short, long)]
        quiet: bool,
    },

    /// Push the prediction results to a ClickHouse database
    ToClickhouse {
        uuid: String,

        /// Database host name
        #[arg(long)]
        host: String,

        /// Database name
        #[arg(long)]
        database: String,

        /// Table name
        #[arg(long)]
        table: String,

        /// native or http
        #[arg(long)]
        protocol: ClickHouseProtocol,

        /// Host port; 0 uses the protocol's default
        #[arg(long, default_value_t = 0)]
        port: u16,

        #[arg(long, env = CLICKHOUSE_USERNAME_ENV, default_value = "root")]
        username: String,

        #[arg(long, env = CLICKHOUSE_PASSWORD_ENV, default_value = "", hide_env_values = true)]
        password: String,

        /// Wait silently and print only the prediction uuid
        #[arg(short, long)]
        quiet: bool,
    },
}

pub async fn run(cmd: PredCommands, session: &Session) -> Result<()> {
    let client = session.authenticated().await?;

    match cmd {
        PredCommands::Ls {
            list,
            disabled,
            completed,
            output,
        } => {
            let predictions = Prediction::ls(&client, list.offset, list.limit, disabled, completed)
                .await
                .context("Failed to list predictions")?;
            output.print(Prediction::as_table(&predictions)?, "prediction_uuid");
        }
        PredCommands::Details { uuid, output } => {
            let table = Prediction::from_uuid(uuid)
                .details(&client)
                .await
                .context("Failed to get prediction details")?;
            output.print(table, "prediction_uuid");
        }
        PredCommands::Rm { uuid, output } => {
            let table = Prediction::from_uuid(uuid)
                .delete(&client)
                .await
                .context("Failed to delete prediction")?;
            output.print(table, "prediction_uuid");
        }
        PredCommands::Results { uuid, format } => {
            let table = Prediction::from_uuid(uuid)
                .results(&client)
                .await
                .context("Failed to get prediction results")?;
            print!("{}", display::render(&table, format.as_deref(), None));
        }
        PredCommands::ToLocal { uuid, path, quiet } => {
            let prediction = Prediction::from_uuid(uuid);
            if !quiet {
                println!("Downloading prediction results for uuid: {}", prediction.uuid);
            }
            let files = prediction
                .to_local(&client, &path, !quiet)
                .await
                .context("Failed to download prediction results")?;
            if quiet {
                println!("{}", prediction.uuid);
            } else {
                println!(
                    "{} {} file(s) written to {}",
                    "✓".green(),
                    files.len(),
                    path.display()
                );
            }
        }
        PredCommands::ToS3 {
            uuid,
            uri,
            access_key,
            secret_key,
            quiet,
        } => {
            let prediction = Prediction::from_uuid(uuid);
            let status = prediction
                .to_s3(&client, &uri, &access_key, &secret_key)
                .await
                .context("Failed to push results to S3")?;
            follow(
                status,
                quiet,
                &prediction.uuid,
                &format!(
                    "Pushing the results for prediction uuid: {} to the s3 bucket.",
                    prediction.uuid
                ),
            )
            .await?;
        }
        PredCommands::ToAzureBlobStorage {
            uuid,
            uri,
            credential,
            quiet,
        } => {
            let prediction = Prediction::from_uuid(uuid);
            let status = prediction
                .to_azure_blob_storage(&client, &uri, &credential)
                .await
                .context("Failed to push results to Azure Blob Storage")?;
            follow(
                status,
                quiet,
                &prediction.uuid,
                &format!(
                    "Pushing the results for prediction uuid: {} to the Azure Blob Storage.",
                    prediction.uuid
                ),
            )
            .await?;
        }
        PredCommands::ToMysql {
            uuid,
            host,
            database,
            table,
            port,
            username,
            password,
            quiet,
        } => {
            let prediction = Prediction::from_uuid(uuid);
            let target = MySqlTarget {
                host,
                port,
                database,
                table,
                username,
                password,
            };
            let status = prediction
                .to_mysql(&client, &target)
                .await
                .context("Failed to push results to MySQL")?;
            follow(
                status,
                quiet,
                &prediction.uuid,
                &format!(
                    "Pushing the results for prediction uuid: {} to the mysql database.",
                    prediction.uuid
                ),
            )
            .await?;
        }
        PredCommands::ToClickhouse {
            uuid,
            host,
            database,
            table,
            protocol,
            port,
            username,
            password,
            quiet,
        } => {
            let prediction = Prediction::from_uuid(uuid);
            let target = ClickHouseTarget {
                host,
                port,
                database,
                table,
                protocol,
                username,
                password,
            };
            let status = prediction
                .to_clickhouse(&client, &target)
                .await
                .context("Failed to push results to ClickHouse")?;
            follow(
                status,
                quiet,
                &prediction.uuid,
                &format!(
                    "Pushing the results for prediction uuid: {} to the clickhouse database.",
                    prediction.uuid
                ),
            )
            .await?;
        }
    }

    Ok(())
}
