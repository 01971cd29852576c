use std::collections::BTreeMap;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};

pub mod api_keys;
pub mod models;
pub mod predictions;
pub mod progress;
pub mod users;

pub const DEFAULT_SERVER_URL: &str = "https://api.airt.ai";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
}

/// Request body with the caller's OTP alongside the payload fields.
#[derive(Debug, Serialize)]
pub(crate) struct WithOtp<'a, T: Serialize> {
    #[serde(flatten)]
    pub body: &'a T,
    pub otp: Option<&'a str>,
}

/// Connection to the service: base URL plus the bearer token of the session.
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self> {
        url::Url::parse(base_url)
            .map_err(|e| Error::Validation(format!("Invalid server URL '{}': {}", base_url, e)))?;

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(Error::Connection)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchanges a username and password for a bearer token and keeps it
    /// for the following requests.
    pub async fn get_token(
        &mut self,
        username: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<String> {
        let password = match otp {
            Some(otp) => json!({ "password": password, "user_otp": otp }).to_string(),
            None => password.to_string(),
        };

        let request = self
            .http
            .post(format!("{}/token", self.base_url))
            .form(&[("username", username), ("password", password.as_str())]);

        let token: AccessToken = Self::send(request).await?;
        self.token = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    /// Server and client versions.
    pub async fn version(&self) -> Result<BTreeMap<String, String>> {
        let mut versions: BTreeMap<String, String> = self.get_data("/version").await?;
        versions.insert("client".to_string(), env!("CARGO_PKG_VERSION").to_string());
        Ok(versions)
    }

    fn build_request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "sending request");
        let mut request = self.http.request(method, &url);

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        request
    }

    async fn send<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, %body, "request failed");
            return Err(Error::from_response(status, &body));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub(crate) async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Self::send(self.build_request(Method::GET, path)).await
    }

    pub(crate) async fn post_data<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        Self::send(self.build_request(Method::POST, path).json(body)).await
    }

    pub(crate) async fn delete_data<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Self::send(self.build_request(Method::DELETE, path)).await
    }

    /// Plain, unauthenticated download of a presigned URL.
    pub(crate) async fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!(%url, "downloading");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_response(status, &body));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
