use chrono::{DateTime, Duration, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::users::User;
use super::{AccessToken, Client};
use crate::error::Result;
use crate::table::{typed_records, Table};
use crate::util::{deserialize_datetime, with_otp, with_query};

pub const API_KEY_COLS: &[&str] = &["uuid", "name", "created", "expiry", "disabled"];

const EXPIRY_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub uuid: String,
    pub name: String,
    #[serde(deserialize_with = "deserialize_datetime")]
    pub created: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "deserialize_datetime")]
    pub expiry: Option<DateTime<Utc>>,
    pub disabled: bool,
}

/// When a new key stops being valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expiry {
    Days(i64),
    After(Duration),
    At(NaiveDateTime),
}

impl Expiry {
    fn to_timestamp(self, now: NaiveDateTime) -> String {
        let at = match self {
            Expiry::Days(days) => now + Duration::days(days),
            Expiry::After(delta) => now + delta,
            Expiry::At(at) => at,
        };
        at.format(EXPIRY_FORMAT).to_string()
    }
}

#[derive(Debug, Serialize)]
struct ApiKeyCreate<'a> {
    name: &'a str,
    expiry: Option<String>,
    otp: Option<&'a str>,
}

impl ApiKey {
    /// Creates a key. Names are unique among a user's active keys; the name of
    /// a revoked key may be reused. Without `expiry` the key never expires.
    pub async fn create(
        client: &Client,
        name: &str,
        expiry: Option<Expiry>,
        otp: Option<&str>,
    ) -> Result<AccessToken> {
        let now = Local::now().naive_local();
        let body = ApiKeyCreate {
            name,
            expiry: expiry.map(|e| e.to_timestamp(now)),
            otp,
        };
        client.post_data("/apikey", &body).await
    }

    /// Keys of `user` (uuid or username), or of the logged-in user.
    pub async fn ls(
        client: &Client,
        user: Option<&str>,
        offset: u64,
        limit: u64,
        include_disabled: bool,
    ) -> Result<Vec<ApiKey>> {
        let user_uuid = User::details(client, user).await?.uuid;
        let path = with_query(
            &format!("/{}/apikey", user_uuid),
            &[
                ("include_disabled", include_disabled.to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ],
        );
        let records: Vec<Value> = client.get_data(&path).await?;
        typed_records(records, API_KEY_COLS)
    }

    pub fn as_table(keys: &[ApiKey]) -> Result<Table> {
        Table::from_records(keys, API_KEY_COLS)
    }

    /// Details of a key by uuid or name.
    pub async fn details(client: &Client, key: &str) -> Result<Table> {
        let details: Value = client.get_data(&format!("/apikey/{}", key)).await?;
        Table::from_values(&[details], API_KEY_COLS)
    }

    /// Revokes keys by uuid or name.
    pub async fn revoke<S: AsRef<str>>(
        client: &Client,
        keys: &[S],
        user: Option<&str>,
        otp: Option<&str>,
    ) -> Result<Table> {
        let user_uuid = User::details(client, user).await?.uuid;

        let mut revoked = Vec::with_capacity(keys.len());
        for key in keys {
            let path = with_otp(&format!("/{}/apikey/{}", user_uuid, key.as_ref()), otp);
            revoked.push(client.delete_data::<Value>(&path).await?);
        }
        Table::from_values(&revoked, API_KEY_COLS)
    }
}
