use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::predictions::Prediction;
use super::progress::ProgressStatus;
use super::Client;
use crate::error::Result;
use crate::table::{typed_records, Table};
use crate::util::{deserialize_datetime, deserialize_nullable, with_query};

pub const BASIC_MODEL_COLS: &[&str] = &["uuid", "created", "total_steps", "completed_steps"];

pub const ALL_MODEL_COLS: &[&str] = &[
    "uuid",
    "created",
    "total_steps",
    "completed_steps",
    "datasource",
    "client_column",
    "target_column",
    "target",
    "predict_after",
    "region",
    "cloud_provider",
    "error",
];

const COLS_TO_RENAME: &[(&str, &str)] = &[("uuid", "model_uuid"), ("datasource", "datasource_uuid")];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub uuid: String,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub datasource: Option<String>,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub client_column: Option<String>,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub target_column: Option<String>,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub target: Option<String>,
    /// Seconds.
    #[serde(deserialize_with = "deserialize_nullable")]
    pub predict_after: Option<f64>,
    #[serde(deserialize_with = "deserialize_datetime")]
    pub created: Option<DateTime<Utc>>,
    pub total_steps: u64,
    pub completed_steps: u64,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub region: Option<String>,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub cloud_provider: Option<String>,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub error: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// Training job parameters.
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub datasource: String,
    pub client_column: String,
    pub target_column: String,
    /// Event to predict, e.g. `*purchase`.
    pub target: String,
    pub predict_after: Duration,
}

impl Model {
    /// Local handle on an existing model.
    pub fn from_uuid(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            ..Default::default()
        }
    }

    /// Starts training; follow it with [`Model::progress`].
    pub async fn train(client: &Client, request: &TrainRequest) -> Result<Model> {
        let body = json!({
            "data_uuid": request.datasource,
            "client_column": request.client_column,
            "target_column": request.target_column,
            "target": request.target,
            "predict_after": request.predict_after.as_secs(),
        });
        let model: Model = client.post_data("/model/train", &body).await?;
        info!(model = %model.uuid, datasource = %request.datasource, "training started");
        Ok(model)
    }

    pub async fn ls(
        client: &Client,
        offset: u64,
        limit: u64,
        disabled: bool,
        completed: bool,
    ) -> Result<Vec<Model>> {
        let path = with_query(
            "/model/",
            &[
                ("disabled", disabled.to_string()),
                ("completed", completed.to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ],
        );
        let records: Vec<Value> = client.get_data(&path).await?;
        typed_records(records, ALL_MODEL_COLS)
    }

    pub fn as_table(models: &[Model]) -> Result<Table> {
        Table::from_records(models, BASIC_MODEL_COLS)?
            .rename(COLS_TO_RENAME)
            .with_ready_column()
    }

    pub async fn details(&self, client: &Client) -> Result<Table> {
        let details: Value = client.get_data(&format!("/model/{}", self.uuid)).await?;
        Table::from_values(&[details], ALL_MODEL_COLS)?
            .rename(COLS_TO_RENAME)
            .with_ready_column()
    }

    pub async fn delete(&self, client: &Client) -> Result<Table> {
        let deleted: Value = client.delete_data(&format!("/model/{}", self.uuid)).await?;
        Table::from_values(&[deleted], BASIC_MODEL_COLS)?
            .rename(COLS_TO_RENAME)
            .with_ready_column()
    }

    /// Runs predictions on `datasource`, or on the datasource the model was
    /// trained on.
    pub async fn predict(&self, client: &Client, datasource: Option<&str>) -> Result<Prediction> {
        let body = json!({ "data_uuid": datasource });
        let prediction: Prediction = client
            .post_data(&format!("/model/{}/predict", self.uuid), &body)
            .await?;
        info!(model = %self.uuid, prediction = %prediction.uuid, "prediction started");
        Ok(prediction)
    }

    pub fn progress(&self, client: &Client) -> ProgressStatus {
        ProgressStatus::new(client, format!("/model/{}", self.uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::client_for;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model_json(uuid: &str, completed: u64) -> Value {
        json!({
            "uuid": uuid,
            "datasource": "ds-1",
            "client_column": "user_id",
            "target_column": "event_type",
            "target": "*purchase",
            "predict_after": 10800.0,
            "created": "2022-05-02T09:00:00",
            "total_steps": 5,
            "completed_steps": completed,
            "region": "eu-west-1",
            "cloud_provider": "aws",
            "error": null,
            "disabled": false,
            "user": "u-1",
        })
    }

    #[tokio::test]
    async fn train_posts_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/model/train"))
            .and(body_string_contains("\"predict_after\":10800"))
            .and(body_string_contains("\"data_uuid\":\"ds-1\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_json("m-1", 0)))
            .expect(1)
            .mount(&server)
            .await;

        let request = TrainRequest {
            datasource: "ds-1".into(),
            client_column: "user_id".into(),
            target_column: "event_type".into(),
            target: "*purchase".into(),
            predict_after: Duration::from_secs(3 * 3600),
        };
        let client = client_for(&server);
        let model = Model::train(&client, &request).await.unwrap();
        assert_eq!(model.uuid, "m-1");
        assert_eq!(model.progress(&client).relative_url(), "/model/m-1");
    }

    #[tokio::test]
    async fn listing_has_ready_column() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/model/"))
            .and(query_param("completed", "false"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([model_json("m-1", 5), model_json("m-2", 2)])),
            )
            .mount(&server)
            .await;

        let models = Model::ls(&client_for(&server), 0, 100, false, false).await.unwrap();
        let table = Model::as_table(&models).unwrap();
        assert_eq!(table.columns(), ["model_uuid", "created", "ready"]);
        assert_eq!(table.column("ready").unwrap(), vec![&json!(true), &json!(false)]);
    }

    #[tokio::test]
    async fn details_rename_and_keep_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/model/m-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_json("m-1", 5)))
            .mount(&server)
            .await;

        let table = Model::from_uuid("m-1").details(&client_for(&server)).await.unwrap();
        assert_eq!(
            table.columns(),
            [
                "model_uuid",
                "created",
                "datasource_uuid",
                "client_column",
                "target_column",
                "target",
                "predict_after",
                "region",
                "cloud_provider",
                "error",
                "ready",
            ]
        );
    }

    #[tokio::test]
    async fn predict_returns_prediction_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/model/m-1/predict"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uuid": "p-1",
                "model": "m-1",
                "datasource": "ds-1",
                "created": "2022-05-03T09:00:00",
                "total_steps": 3,
                "completed_steps": 0,
                "region": "eu-west-1",
                "cloud_provider": "aws",
                "error": null,
                "disabled": false,
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let prediction = Model::from_uuid("m-1").predict(&client, None).await.unwrap();
        assert_eq!(prediction.model.as_deref(), Some("m-1"));
        assert_eq!(prediction.progress(&client).relative_url(), "/prediction/p-1");
    }

    #[tokio::test]
    async fn listing_with_missing_steps_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/model/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"uuid": "m-1", "created": "2022-05-02T09:00:00"},
            ])))
            .mount(&server)
            .await;

        let err = Model::ls(&client_for(&server), 0, 100, false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::MissingColumn(c) if c == "total_steps"));
    }
}
