//! Tracking of asynchronous server-side jobs.
//!
//! Trainings, predictions and exports run on the service; the client only
//! learns about them by polling a status URL that reports `total_steps`,
//! `completed_steps` and an optional `error`.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use super::Client;
use crate::error::{Error, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub total_steps: u64,
    pub completed_steps: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Lifecycle of a job as seen from its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    InProgress,
    Ready,
    Failed,
}

impl JobStatus {
    pub fn ready(&self) -> bool {
        self.completed_steps == self.total_steps
    }

    pub fn state(&self) -> JobState {
        if self.error.is_some() {
            JobState::Failed
        } else if self.ready() {
            JobState::Ready
        } else if self.completed_steps == 0 {
            JobState::Pending
        } else {
            JobState::InProgress
        }
    }

    pub fn fraction(&self) -> f64 {
        if self.total_steps == 0 {
            1.0
        } else {
            self.completed_steps as f64 / self.total_steps as f64
        }
    }
}

/// Handle on one job. Returned by long-running operations instead of
/// blocking; call [`wait`](Self::wait) or [`progress_bar`](Self::progress_bar)
/// to follow it.
#[derive(Debug, Clone)]
pub struct ProgressStatus {
    client: Client,
    relative_url: String,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl ProgressStatus {
    pub fn new(client: &Client, relative_url: impl Into<String>) -> Self {
        Self {
            client: client.clone(),
            relative_url: relative_url.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn relative_url(&self) -> &str {
        &self.relative_url
    }

    /// Current status. A job failed on the server surfaces as
    /// [`Error::Application`] carrying the server's message.
    pub async fn fetch(&self) -> Result<JobStatus> {
        let status: JobStatus = self.client.get_data(&self.relative_url).await?;
        debug!(
            url = %self.relative_url,
            completed = status.completed_steps,
            total = status.total_steps,
            "job status"
        );

        match status.error {
            Some(error) => Err(Error::Application(error)),
            None => Ok(status),
        }
    }

    pub async fn is_ready(&self) -> Result<bool> {
        Ok(self.fetch().await?.ready())
    }

    /// Blocks until the job is ready, failed, or the timeout expires.
    pub async fn wait(&self) -> Result<JobStatus> {
        self.watch(|_| {}).await
    }

    /// Like [`wait`](Self::wait), handing every fetched status to `on_status`.
    pub async fn watch<F>(&self, mut on_status: F) -> Result<JobStatus>
    where
        F: FnMut(&JobStatus),
    {
        let started = Instant::now();
        loop {
            let status = self.fetch().await?;
            on_status(&status);
            if status.ready() {
                return Ok(status);
            }

            let mut pause = self.poll_interval;
            if let Some(timeout) = self.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    return Err(Error::Timeout {
                        url: self.relative_url.clone(),
                        elapsed,
                    });
                }
                pause = pause.min(timeout - elapsed);
            }
            tokio::time::sleep(pause).await;
        }
    }

    /// [`wait`](Self::wait) with a terminal progress bar.
    pub async fn progress_bar(&self) -> Result<JobStatus> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let result = self
            .watch(|status| {
                bar.set_length(status.total_steps);
                bar.set_position(status.completed_steps);
            })
            .await;

        match &result {
            Ok(_) => bar.finish(),
            Err(_) => bar.abandon(),
        }
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    use super::*;
    use crate::client::tests::client_for;

    /// Replays bodies in order, repeating the last one.
    pub(crate) struct Sequence {
        bodies: Vec<Value>,
        calls: AtomicUsize,
    }

    impl Sequence {
        pub(crate) fn new(bodies: Vec<Value>) -> Self {
            Self {
                bodies,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Respond for Sequence {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            let body = &self.bodies[i.min(self.bodies.len() - 1)];
            ResponseTemplate::new(200).set_body_json(body.clone())
        }
    }

    fn steps(completed: u64, total: u64) -> Value {
        json!({"total_steps": total, "completed_steps": completed, "error": null})
    }

    #[test]
    fn state_follows_steps_and_error() {
        let mut status = JobStatus {
            total_steps: 3,
            completed_steps: 0,
            error: None,
        };
        assert_eq!(status.state(), JobState::Pending);
        status.completed_steps = 1;
        assert_eq!(status.state(), JobState::InProgress);
        status.completed_steps = 3;
        assert_eq!(status.state(), JobState::Ready);
        status.error = Some("disk full".into());
        assert_eq!(status.state(), JobState::Failed);
    }

    #[tokio::test]
    async fn ready_on_first_fetch_does_not_sleep() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prediction/push/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(steps(2, 2)))
            .expect(1)
            .mount(&server)
            .await;

        let status = ProgressStatus::new(&client_for(&server), "/prediction/push/p1")
            .with_poll_interval(Duration::from_secs(3600));

        let done = tokio::time::timeout(Duration::from_secs(5), status.wait())
            .await
            .expect("wait slept although the job was ready")
            .unwrap();
        assert!(done.ready());
    }

    #[tokio::test]
    async fn server_error_ends_the_loop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/model/m1"))
            .respond_with(Sequence::new(vec![
                steps(0, 4),
                json!({"total_steps": 4, "completed_steps": 1, "error": "Target column not found"}),
            ]))
            .mount(&server)
            .await;

        let status = ProgressStatus::new(&client_for(&server), "/model/m1")
            .with_poll_interval(Duration::from_millis(10));

        let err = status.wait().await.unwrap_err();
        assert!(matches!(&err, Error::Application(m) if m == "Target column not found"));

        let err = status.progress_bar().await.unwrap_err();
        assert!(matches!(err, Error::Application(_)));
    }

    #[tokio::test]
    async fn never_completing_job_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prediction/push/p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(steps(1, 4)))
            .mount(&server)
            .await;

        let timeout = Duration::from_millis(200);
        let interval = Duration::from_millis(50);
        let status = ProgressStatus::new(&client_for(&server), "/prediction/push/p2")
            .with_poll_interval(interval)
            .with_timeout(timeout);

        let started = std::time::Instant::now();
        let err = status.wait().await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(elapsed >= timeout);
        // sleeps are clamped to the deadline, so at most one more round trip
        assert!(elapsed < timeout + interval + Duration::from_secs(1), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn progress_reports_fractions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prediction/push/p3"))
            .respond_with(Sequence::new(vec![steps(0, 4), steps(2, 4), steps(4, 4)]))
            .expect(3)
            .mount(&server)
            .await;

        let status = ProgressStatus::new(&client_for(&server), "/prediction/push/p3")
            .with_poll_interval(Duration::from_millis(10));

        let mut fractions = Vec::new();
        let done = status.watch(|s| fractions.push(s.fraction())).await.unwrap();

        assert_eq!(fractions, vec![0.0, 0.5, 1.0]);
        assert_eq!(done.state(), JobState::Ready);
    }

    #[tokio::test]
    async fn progress_bar_returns_after_completion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prediction/push/p4"))
            .respond_with(Sequence::new(vec![steps(0, 4), steps(2, 4), steps(4, 4)]))
            .expect(3)
            .mount(&server)
            .await;

        let status = ProgressStatus::new(&client_for(&server), "/prediction/push/p4")
            .with_poll_interval(Duration::from_millis(10));

        let done = status.progress_bar().await.unwrap();
        assert_eq!(done.completed_steps, 4);
    }
}
