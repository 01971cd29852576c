//! Client library for the airt machine learning service.
//!
//! All calls go through an explicit [`Client`] carrying the server URL and
//! the session token:
//!
//! ```no_run
//! use airt::{Client, Prediction};
//!
//! # async fn run() -> airt::Result<()> {
//! let mut client = Client::new("https://api.airt.ai")?;
//! client.get_token("jane", "secret", None).await?;
//!
//! let predictions = Prediction::ls(&client, 0, 100, false, false).await?;
//! println!("{}", Prediction::as_table(&predictions)?);
//!
//! let export = predictions[0]
//!     .to_s3(&client, "s3://bucket/results", "access", "secret")
//!     .await?;
//! export.wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod table;
pub mod util;

pub use client::api_keys::{ApiKey, Expiry};
pub use client::models::{Model, TrainRequest};
pub use client::predictions::{ClickHouseProtocol, ClickHouseTarget, MySqlTarget, Prediction};
pub use client::progress::{JobState, JobStatus, ProgressStatus};
pub use client::users::{NewUser, User, UserUpdate};
pub use client::{AccessToken, Client, DEFAULT_SERVER_URL};
pub use error::{Error, Result};
pub use table::Table;
