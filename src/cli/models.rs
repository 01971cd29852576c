use std::time::Duration;

use anyhow::{Context, Result};
use clap::Subcommand;

use airt::{Model, TrainRequest};

use super::{follow, ListArgs, OutputArgs, Session};

#[derive(Subcommand)]
pub enum ModelCommands {
    /// List models
    Ls {
        #[command(flatten)]
        list: ListArgs,

        /// List only deleted models
        #[arg(long)]
        disabled: bool,

        /// List only models whose training finished
        #[arg(long)]
        completed: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show details of a model
    Details {
        uuid: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Delete a model
    Rm {
        uuid: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Train a model on a datasource
    Train {
        /// Datasource uuid
        #[arg(long)]
        datasource: String,

        /// Column identifying the client
        #[arg(long)]
        client_column: String,

        /// Column holding the event to predict
        #[arg(long)]
        target_column: String,

        /// Event to predict, e.g. "*purchase"
        #[arg(long)]
        target: String,

        /// How far ahead to predict, in seconds
        #[arg(long)]
        predict_after: u64,

        /// Wait silently and print only the model uuid
        #[arg(short, long)]
        quiet: bool,
    },

    /// Run predictions with a trained model
    Predict {
        uuid: String,

        /// Datasource to predict on; defaults to the training datasource
        #[arg(long)]
        datasource: Option<String>,

        /// Wait silently and print only the prediction uuid
        #[arg(short, long)]
        quiet: bool,
    },
}

pub async fn run(cmd: ModelCommands, session: &Session) -> Result<()> {
    let client = session.authenticated().await?;

    match cmd {
        ModelCommands::Ls {
            list,
            disabled,
            completed,
            output,
        } => {
            let models = Model::ls(&client, list.offset, list.limit, disabled, completed)
                .await
                .context("Failed to list models")?;
            output.print(Model::as_table(&models)?, "model_uuid");
        }
        ModelCommands::Details { uuid, output } => {
            let table = Model::from_uuid(uuid)
                .details(&client)
                .await
                .context("Failed to get model details")?;
            output.print(table, "model_uuid");
        }
        ModelCommands::Rm { uuid, output } => {
            let table = Model::from_uuid(uuid)
                .delete(&client)
                .await
                .context("Failed to delete model")?;
            output.print(table, "model_uuid");
        }
        ModelCommands::Train {
            datasource,
            client_column,
            target_column,
            target,
            predict_after,
            quiet,
        } => {
            let request = TrainRequest {
                datasource,
                client_column,
                target_column,
                target,
                predict_after: Duration::from_secs(predict_after),
            };
            let model = Model::train(&client, &request)
                .await
                .context("Failed to start training")?;
            follow(
                model.progress(&client),
                quiet,
                &model.uuid,
                &format!("Training model uuid: {}", model.uuid),
            )
            .await?;
        }
        ModelCommands::Predict {
            uuid,
            datasource,
            quiet,
        } => {
            let prediction = Model::from_uuid(uuid)
                .predict(&client, datasource.as_deref())
                .await
                .context("Failed to start predictions")?;
            follow(
                prediction.progress(&client),
                quiet,
                &prediction.uuid,
                &format!("Running predictions, prediction uuid: {}", prediction.uuid),
            )
            .await?;
        }
    }

    Ok(())
}
