use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use super::progress::ProgressStatus;
use super::Client;
use crate::error::{Error, Result};
use crate::table::{typed_records, Table};
use crate::util::{deserialize_datetime, deserialize_nullable, with_query};

pub const BASIC_PRED_COLS: &[&str] = &["uuid", "created", "total_steps", "completed_steps"];

pub const ALL_PRED_COLS: &[&str] = &[
    "uuid",
    "created",
    "total_steps",
    "completed_steps",
    "model",
    "datasource",
    "region",
    "cloud_provider",
    "error",
];

const COLS_TO_RENAME: &[(&str, &str)] = &[
    ("uuid", "prediction_uuid"),
    ("datasource", "datasource_uuid"),
    ("model", "model_uuid"),
];

const SCORE_COLUMN: &str = "Score";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub uuid: String,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub model: Option<String>,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub datasource: Option<String>,
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
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MySqlTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub table: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickHouseProtocol {
    Native,
    Http,
}

impl FromStr for ClickHouseProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown protocol '{}', expected native or http", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClickHouseTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub table: String,
    pub protocol: ClickHouseProtocol,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct PushJob {
    uuid: String,
}

impl Prediction {
    /// Local handle on an existing prediction.
    pub fn from_uuid(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            ..Default::default()
        }
    }

    /// `disabled` lists deleted predictions only; `completed` only the ones
    /// that finished successfully.
    pub async fn ls(
        client: &Client,
        offset: u64,
        limit: u64,
        disabled: bool,
        completed: bool,
    ) -> Result<Vec<Prediction>> {
        let path = with_query(
            "/prediction/",
            &[
                ("disabled", disabled.to_string()),
                ("completed", completed.to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ],
        );
        let records: Vec<Value> = client.get_data(&path).await?;
        typed_records(records, ALL_PRED_COLS)
    }

    pub fn as_table(predictions: &[Prediction]) -> Result<Table> {
        Table::from_records(predictions, BASIC_PRED_COLS)?
            .rename(COLS_TO_RENAME)
            .with_ready_column()
    }

    pub async fn details(&self, client: &Client) -> Result<Table> {
        let details: Value = client
            .get_data(&format!("/prediction/{}", self.uuid))
            .await?;
        Table::from_values(&[details], ALL_PRED_COLS)?
            .rename(COLS_TO_RENAME)
            .with_ready_column()
    }

    pub async fn delete(&self, client: &Client) -> Result<Table> {
        let deleted: Value = client
            .delete_data(&format!("/prediction/{}", self.uuid))
            .await?;
        Table::from_values(&[deleted], BASIC_PRED_COLS)?
            .rename(COLS_TO_RENAME)
            .with_ready_column()
    }

    pub fn progress(&self, client: &Client) -> ProgressStatus {
        ProgressStatus::new(client, format!("/prediction/{}", self.uuid))
    }

    /// Prediction results, highest score first.
    ///
    /// The first column is the client index the scores belong to.
    pub async fn results(&self, client: &Client) -> Result<Table> {
        let response: Map<String, Value> = client
            .get_data(&format!("/prediction/{}/pandas", self.uuid))
            .await?;
        results_table(response)
    }

    pub async fn to_s3(
        &self,
        client: &Client,
        uri: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<ProgressStatus> {
        let body = json!({
            "uri": uri,
            "access_key": access_key,
            "secret_key": secret_key,
        });
        self.push(client, "to_s3", &body).await
    }

    pub async fn to_azure_blob_storage(
        &self,
        client: &Client,
        uri: &str,
        credential: &str,
    ) -> Result<ProgressStatus> {
        let body = json!({ "uri": uri, "credential": credential });
        self.push(client, "to_azure_blob_storage", &body).await
    }

    pub async fn to_mysql(&self, client: &Client, target: &MySqlTarget) -> Result<ProgressStatus> {
        self.push(client, "to_mysql", target).await
    }

    pub async fn to_clickhouse(
        &self,
        client: &Client,
        target: &ClickHouseTarget,
    ) -> Result<ProgressStatus> {
        self.push(client, "to_clickhouse", target).await
    }

    async fn push<B: Serialize + ?Sized>(
        &self,
        client: &Client,
        action: &str,
        body: &B,
    ) -> Result<ProgressStatus> {
        let job: PushJob = client
            .post_data(&format!("/prediction/{}/{}", self.uuid, action), body)
            .await?;
        info!(prediction = %self.uuid, job = %job.uuid, action, "export started");
        Ok(ProgressStatus::new(
            client,
            format!("/prediction/push/{}", job.uuid),
        ))
    }

    /// Downloads the result files into the existing directory `path`.
    pub async fn to_local(
        &self,
        client: &Client,
        path: &Path,
        show_progress: bool,
    ) -> Result<Vec<PathBuf>> {
        if !path.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("'{}' is not a directory", path.display()),
            )));
        }

        let files: Map<String, Value> = client
            .get_data(&format!("/prediction/{}/to_local", self.uuid))
            .await?;

        let bar = if show_progress {
            ProgressBar::new(files.len() as u64)
        } else {
            ProgressBar::hidden()
        };

        let mut written = Vec::with_capacity(files.len());
        for (file_name, url) in &files {
            let url = url
                .as_str()
                .ok_or_else(|| Error::Decode(format!("no download URL for {}", file_name)))?;
            // never write outside `path`
            let name = Path::new(file_name)
                .file_name()
                .ok_or_else(|| Error::Decode(format!("invalid file name '{}'", file_name)))?;

            let bytes = client.download(url).await?;
            let target = path.join(name);
            tokio::fs::write(&target, bytes).await?;
            written.push(target);
            bar.inc(1);
        }
        bar.finish_and_clear();

        Ok(written)
    }
}

/// Values of one result column. Mapping-shaped columns are aligned on the
/// row keys of the first such column, not on their own key order.
fn column_values(
    name: &str,
    column: Value,
    row_keys: &mut Option<Vec<String>>,
) -> Result<Vec<Value>> {
    match column {
        Value::Array(values) => Ok(values),
        Value::Object(mut by_index) => match row_keys {
            None => {
                *row_keys = Some(by_index.keys().cloned().collect());
                Ok(by_index.into_iter().map(|(_, v)| v).collect())
            }
            Some(keys) => {
                if by_index.len() != keys.len() {
                    return Err(Error::Decode(format!(
                        "column '{}' has {} rows, expected {}",
                        name,
                        by_index.len(),
                        keys.len()
                    )));
                }
                keys.iter()
                    .map(|key| {
                        by_index.remove(key).ok_or_else(|| {
                            Error::Decode(format!("column '{}' has no row '{}'", name, key))
                        })
                    })
                    .collect()
            }
        },
        other => Err(Error::Decode(format!(
            "column '{}' is neither a list nor a mapping: {}",
            name, other
        ))),
    }
}

fn score(row: &[Value], idx: usize) -> f64 {
    row[idx].as_f64().unwrap_or(f64::NEG_INFINITY)
}

fn results_table(response: Map<String, Value>) -> Result<Table> {
    if !response.contains_key(SCORE_COLUMN) {
        return Err(Error::MissingColumn(SCORE_COLUMN.to_string()));
    }

    let mut columns = Vec::with_capacity(response.len());
    let mut values = Vec::with_capacity(response.len());
    let mut row_keys = None;
    for (name, column) in response {
        values.push(column_values(&name, column, &mut row_keys)?);
        columns.push(name);
    }

    // the index is the first non-score column; it goes first
    let index = columns
        .iter()
        .position(|c| c != SCORE_COLUMN)
        .ok_or_else(|| Error::MissingColumn("index".to_string()))?;
    columns.swap(0, index);
    values.swap(0, index);

    let len = values[0].len();
    if values.iter().any(|v| v.len() != len) {
        return Err(Error::Decode("result columns differ in length".to_string()));
    }

    let mut rows: Vec<Vec<Value>> = (0..len)
        .map(|i| values.iter().map(|column| column[i].clone()).collect())
        .collect();

    let score_idx = columns
        .iter()
        .position(|c| c == SCORE_COLUMN)
        .ok_or_else(|| Error::MissingColumn(SCORE_COLUMN.to_string()))?;
    rows.sort_by(|a, b| {
        score(b, score_idx)
            .partial_cmp(&score(a, score_idx))
            .unwrap_or(Ordering::Equal)
    });

    Ok(Table::from_parts(columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::progress::tests::Sequence;
    use crate::client::tests::client_for;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prediction_json(uuid: &str, completed: u64) -> Value {
        json!({
            "uuid": uuid,
            "model": "m-1",
            "datasource": "ds-1",
            "created": "2022-05-03T09:00:00",
            "total_steps": 3,
            "completed_steps": completed,
            "region": "eu-west-1",
            "cloud_provider": "aws",
            "error": null,
            "disabled": false,
            "user": "u-1",
            "internal_path": "s3://bucket/p",
        })
    }

    #[tokio::test]
    async fn listing_keeps_fixed_columns_despite_extra_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prediction/"))
            .and(query_param("offset", "0"))
            .and(query_param("limit", "100"))
            .and(query_param("disabled", "false"))
            .and(query_param("completed", "true"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([prediction_json("p-1", 3), prediction_json("p-2", 1)])),
            )
            .mount(&server)
            .await;

        let predictions = Prediction::ls(&client_for(&server), 0, 100, false, true)
            .await
            .unwrap();
        let table = Prediction::as_table(&predictions).unwrap();
        assert_eq!(table.columns(), ["prediction_uuid", "created", "ready"]);
        assert_eq!(table.get(0, "prediction_uuid"), Some(&json!("p-1")));
        assert_eq!(table.column("ready").unwrap(), vec![&json!(true), &json!(false)]);
    }

    #[tokio::test]
    async fn details_are_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prediction/p-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(prediction_json("p-1", 3)))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let prediction = Prediction::from_uuid("p-1");
        let first = prediction.details(&client).await.unwrap();
        let second = prediction.details(&client).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.get(0, "model_uuid"), Some(&json!("m-1")));
        assert_eq!(first.columns().last().map(String::as_str), Some("ready"));
    }

    #[tokio::test]
    async fn details_missing_column_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prediction/p-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uuid": "p-9",
                "created": "2022-05-03T09:00:00",
                "total_steps": 3,
                "completed_steps": 3,
            })))
            .mount(&server)
            .await;

        let err = Prediction::from_uuid("p-9")
            .details(&client_for(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingColumn(c) if c == "model"));
    }

    #[tokio::test]
    async fn results_are_sorted_by_score() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prediction/p-1/pandas"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Score": {"0": 0.2, "1": 0.9, "2": 0.5},
                "user_id": {"0": 11, "1": 12, "2": 13},
            })))
            .mount(&server)
            .await;

        let table = Prediction::from_uuid("p-1")
            .results(&client_for(&server))
            .await
            .unwrap();
        assert_eq!(table.columns(), ["user_id", "Score"]);
        assert_eq!(
            table.column("user_id").unwrap(),
            vec![&json!(12), &json!(13), &json!(11)]
        );
    }

    #[test]
    fn results_align_rows_by_index_key() {
        let response = json!({
            "user_id": {"0": 11, "1": 12},
            "Score": {"1": 0.9, "0": 0.2},
        });
        let Value::Object(response) = response else {
            unreachable!()
        };
        let table = results_table(response).unwrap();
        assert_eq!(table.rows(), [vec![json!(12), json!(0.9)], vec![json!(11), json!(0.2)]]);
    }

    #[test]
    fn results_with_unmatched_index_are_rejected() {
        let response = json!({
            "user_id": {"0": 11, "1": 12},
            "Score": {"0": 0.2, "7": 0.9},
        });
        let Value::Object(response) = response else {
            unreachable!()
        };
        assert!(matches!(results_table(response), Err(Error::Decode(_))));
    }

    #[tokio::test]
    async fn listing_with_missing_field_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prediction/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"uuid": "p-1"}])))
            .mount(&server)
            .await;

        let err = Prediction::ls(&client_for(&server), 0, 100, false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingColumn(c) if c == "created"));
    }

    #[tokio::test]
    async fn listing_and_details_render_created_alike() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prediction/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([prediction_json("p-1", 3)])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/prediction/p-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(prediction_json("p-1", 3)))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let predictions = Prediction::ls(&client, 0, 100, false, false).await.unwrap();
        let listed = Prediction::as_table(&predictions).unwrap();
        let details = Prediction::from_uuid("p-1").details(&client).await.unwrap();
        assert_eq!(listed.get(0, "created"), Some(&json!("2022-05-03T09:00:00Z")));
        assert_eq!(listed.get(0, "created"), details.get(0, "created"));
    }

    #[test]
    fn results_without_score_are_rejected() {
        let mut response = Map::new();
        response.insert("user_id".into(), json!([1, 2]));
        assert!(matches!(
            results_table(response),
            Err(Error::MissingColumn(c)) if c == "Score"
        ));
    }

    #[tokio::test]
    async fn s3_export_returns_push_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prediction/p-1/to_s3"))
            .and(body_string_contains("\"uri\":\"s3://target/results\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "push-1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/prediction/push/push-1"))
            .respond_with(Sequence::new(vec![
                json!({"total_steps": 2, "completed_steps": 0, "error": null}),
                json!({"total_steps": 2, "completed_steps": 2, "error": null}),
            ]))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let status = Prediction::from_uuid("p-1")
            .to_s3(&client, "s3://target/results", "AKIA", "secret")
            .await
            .unwrap()
            .with_poll_interval(Duration::from_millis(10));
        assert_eq!(status.relative_url(), "/prediction/push/push-1");
        assert!(status.wait().await.unwrap().ready());
    }

    #[tokio::test]
    async fn clickhouse_export_sends_protocol() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prediction/p-1/to_clickhouse"))
            .and(body_string_contains("\"protocol\":\"native\""))
            .and(body_string_contains("\"port\":9000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "push-2"})))
            .expect(1)
            .mount(&server)
            .await;

        let target = ClickHouseTarget {
            host: "db.local".into(),
            port: 9000,
            database: "results".into(),
            table: "scores".into(),
            protocol: "Native".parse().unwrap(),
            username: "root".into(),
            password: String::new(),
        };
        let status = Prediction::from_uuid("p-1")
            .to_clickhouse(&client_for(&server), &target)
            .await
            .unwrap();
        assert_eq!(status.relative_url(), "/prediction/push/push-2");
    }

    #[tokio::test]
    async fn to_local_downloads_every_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prediction/p-1/to_local"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "part-0.parquet": format!("{}/files/part-0", server.uri()),
                "part-1.parquet": format!("{}/files/part-1", server.uri()),
            })))
            .mount(&server)
            .await;
        for part in ["part-0", "part-1"] {
            Mock::given(method("GET"))
                .and(path(format!("/files/{}", part)))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(part.as_bytes().to_vec()))
                .mount(&server)
                .await;
        }

        let dir = tempfile::tempdir().unwrap();
        let written = Prediction::from_uuid("p-1")
            .to_local(&client_for(&server), dir.path(), false)
            .await
            .unwrap();

        assert_eq!(written.len(), 2);
        let content = std::fs::read(dir.path().join("part-1.parquet")).unwrap();
        assert_eq!(content, b"part-1");
    }

    #[tokio::test]
    async fn to_local_requires_existing_directory() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let err = Prediction::from_uuid("p-1")
            .to_local(&client_for(&server), &dir.path().join("missing"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
