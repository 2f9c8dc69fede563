use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::config::RetrySection;

use super::error::BrowserError;
use super::sleeper::{Sleeper, TokioSleeper};

/// Closed set of failure kinds an operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    NotInteractable,
    ElementMissing,
    Timeout,
    Navigation,
    Launch,
    Download,
    Other,
}

pub trait Classify {
    fn failure_kind(&self) -> FailureKind;
}

impl Classify for BrowserError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            BrowserError::NotInteractable(_) => FailureKind::NotInteractable,
            BrowserError::ElementNotFound(_) => FailureKind::ElementMissing,
            BrowserError::Timeout(_) => FailureKind::Timeout,
            BrowserError::Navigation(_) => FailureKind::Navigation,
            BrowserError::Launch(_) | BrowserError::DriverUnavailable(_) => FailureKind::Launch,
            BrowserError::DownloadDirNotExclusive { .. }
            | BrowserError::DownloadNeverStarted { .. }
            | BrowserError::DownloadAnomaly { .. }
            | BrowserError::DownloadStalled { .. }
            | BrowserError::DownloadVanished { .. } => FailureKind::Download,
            BrowserError::Cdp(err) => {
                if err.to_string().to_lowercase().contains("timeout") {
                    FailureKind::Timeout
                } else {
                    FailureKind::Other
                }
            }
            BrowserError::Io(_) | BrowserError::Configuration(_) | BrowserError::Profile(_) => {
                FailureKind::Other
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: T,
    pub attempts: usize,
}

/// Re-runs flaky interactions with a fixed delay between attempts.
///
/// Only [`FailureKind::NotInteractable`] and [`FailureKind::ElementMissing`]
/// are retried, plus one optional extra kind. Anything else is returned as
/// soon as it happens.
#[derive(Clone)]
pub struct PatientRetry {
    retry_interval: Duration,
    max_attempts: usize,
    extra: Option<FailureKind>,
    sleeper: Arc<dyn Sleeper>,
}

impl PatientRetry {
    pub const BUILT_IN: [FailureKind; 2] =
        [FailureKind::NotInteractable, FailureKind::ElementMissing];

    pub fn new(config: RetrySection) -> Self {
        Self {
            retry_interval: Duration::from_secs(config.retry_interval_seconds),
            max_attempts: config.max_attempts.max(1),
            extra: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn also_retry(mut self, kind: FailureKind) -> Self {
        self.extra = Some(kind);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        Self::BUILT_IN.contains(&kind) || self.extra == Some(kind)
    }

    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> Result<RetryOutcome<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let mut attempt = 0usize;
        loop {
            match operation().await {
                Ok(result) => {
                    return Ok(RetryOutcome {
                        result,
                        attempts: attempt + 1,
                    });
                }
                Err(error) => {
                    let kind = error.failure_kind();
                    if !self.is_retryable(kind) {
                        return Err(error);
                    }
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        warn!(attempts = attempt, error = %error, "Permanently failed, giving up");
                        return Err(error);
                    }
                    warn!(
                        attempt,
                        kind = ?kind,
                        error = %error,
                        delay_seconds = self.retry_interval.as_secs(),
                        "Operation failed, retrying"
                    );
                    self.sleeper.sleep(self.retry_interval).await;
                }
            }
        }
    }
}

impl std::fmt::Debug for PatientRetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatientRetry")
            .field("retry_interval", &self.retry_interval)
            .field("max_attempts", &self.max_attempts)
            .field("extra", &self.extra)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingSleeper {
        calls: Mutex<Vec<Duration>>,
    }

    #[async_trait::async_trait]
    impl Sleeper for CountingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.calls.lock().unwrap().push(duration);
        }
    }

    fn policy(max_attempts: usize, sleeper: Arc<CountingSleeper>) -> PatientRetry {
        PatientRetry::new(RetrySection {
            retry_interval_seconds: 2,
            max_attempts,
        })
        .with_sleeper(sleeper)
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let sleeper = Arc::new(CountingSleeper::default());
        let retry = policy(5, Arc::clone(&sleeper));
        let mut calls = 0usize;

        let outcome = retry
            .run(|| {
                calls += 1;
                let call = calls;
                async move {
                    if call <= 3 {
                        Err(BrowserError::NotInteractable(format!("#submit (call {call})")))
                    } else {
                        Ok("clicked")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.result, "clicked");
        assert_eq!(outcome.attempts, 4);
        let sleeps = sleeper.calls.lock().unwrap();
        assert_eq!(sleeps.len(), 3);
        assert!(sleeps.iter().all(|d| *d == Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn exhausting_attempts_returns_last_failure() {
        let sleeper = Arc::new(CountingSleeper::default());
        let retry = policy(3, Arc::clone(&sleeper));
        let mut calls = 0usize;

        let err = retry
            .run(|| {
                calls += 1;
                let call = calls;
                async move { Err::<(), _>(BrowserError::ElementNotFound(format!("call {call}"))) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BrowserError::ElementNotFound(ref msg) if msg == "call 3"));
        assert_eq!(calls, 3);
        assert_eq!(sleeper.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failures_equal_to_attempt_budget_are_fatal() {
        let sleeper = Arc::new(CountingSleeper::default());
        let retry = policy(2, Arc::clone(&sleeper));
        let mut calls = 0usize;

        let result = retry
            .run(|| {
                calls += 1;
                let call = calls;
                async move {
                    if call <= 2 {
                        Err(BrowserError::ElementNotFound("#menu".into()))
                    } else {
                        Ok(call)
                    }
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn unlisted_failure_propagates_immediately() {
        let sleeper = Arc::new(CountingSleeper::default());
        let retry = policy(5, Arc::clone(&sleeper));
        let mut calls = 0usize;

        let err = retry
            .run(|| {
                calls += 1;
                async { Err::<(), _>(BrowserError::Timeout("page load".into())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BrowserError::Timeout(_)));
        assert_eq!(calls, 1);
        assert!(sleeper.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn extra_kind_joins_the_allow_list() {
        let sleeper = Arc::new(CountingSleeper::default());
        let retry = policy(5, Arc::clone(&sleeper)).also_retry(FailureKind::Timeout);
        let mut calls = 0usize;

        let outcome = retry
            .run(|| {
                calls += 1;
                let call = calls;
                async move {
                    if call == 1 {
                        Err(BrowserError::Timeout("page load".into()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
        assert_eq!(sleeper.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let retry = PatientRetry::new(RetrySection {
            retry_interval_seconds: 0,
            max_attempts: 0,
        });
        assert_eq!(retry.max_attempts(), 1);
    }

    #[test]
    fn classification_covers_download_failures() {
        let err = BrowserError::DownloadStalled {
            path: "/dl/a.crdownload".into(),
            size: 10,
        };
        assert_eq!(err.failure_kind(), FailureKind::Download);
        assert_eq!(
            BrowserError::DriverUnavailable("missing".into()).failure_kind(),
            FailureKind::Launch
        );
    }
}
