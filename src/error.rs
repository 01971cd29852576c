use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The service could not be reached.
    #[error("Failed to connect to the service: {0}")]
    Connection(#[source] reqwest::Error),

    /// Missing, expired or rejected credentials (including OTPs).
    #[error("{0}")]
    Auth(String),

    /// Bad arguments, either caught locally or reported by the service.
    #[error("{0}")]
    Validation(String),

    #[error("Timed out after {elapsed:?} waiting for {url}")]
    Timeout { url: String, elapsed: Duration },

    /// A failure reported by the service, verbatim.
    #[error("{0}")]
    Application(String),

    #[error("Column `{0}` is missing from the server response")]
    MissingColumn(String),

    #[error("Failed to parse response: {0}")]
    Decode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Maps a non-2xx status and its body onto an error kind.
    pub(crate) fn from_response(status: StatusCode, body: &str) -> Self {
        let message = detail_message(body).unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body.to_string()
            }
        });

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(message),
            s if s.is_server_error() => Error::Application(message),
            _ => Error::Validation(message),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::Decode(err.to_string())
        } else {
            Error::Connection(err)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

// FastAPI style bodies: {"detail": "..."} or {"detail": [{"msg": "..."}, ...]}
fn detail_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if msgs.is_empty() {
                None
            } else {
                Some(msgs.join("; "))
            }
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
