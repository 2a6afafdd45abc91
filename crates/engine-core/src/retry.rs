use connectors::sql::base::error::DbError;
use std::{future::Future, time::Duration};
use tokio::time::sleep;
use tracing::warn;

/// Exponential backoff for connection-level operations (opening sessions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub async fn run<F, Fut, T>(&self, what: &str, mut op: F) -> Result<T, DbError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        operation = %what,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        let factor = 1u32 << attempt.min(6);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Driver and connection failures are worth another attempt; application
/// level write errors are not.
pub fn is_transient(err: &DbError) -> bool {
    match err {
        DbError::MySql(mysql_err) => matches!(
            mysql_err,
            mysql_async::Error::Io(_) | mysql_async::Error::Driver(_)
        ),
        DbError::Unknown(_) => true,
        _ => false,
    }
}
