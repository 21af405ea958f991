// Retry orchestration
// Wraps client operations so that an invalidated session is transparently
// reinitialized and the operation retried with backoff. Plain calls and
// streaming calls share one policy through two typed entry points.

use std::future::Future;
use std::time::Duration;

use async_stream::stream;
use futures::pin_mut;
use futures::stream::{Stream, StreamExt};

use crate::client::GeminiClient;
use crate::error::Result;

/// Multiplier for the retry backoff, in seconds.
pub const DELAY_FACTOR: u64 = 5;

/// Backoff before the next attempt: `(budget - remaining + 1) * DELAY_FACTOR`
/// seconds, `remaining` counting down from `budget`. Successive delays grow
/// as the budget is consumed (5 s, 10 s, 15 s for a budget of 3).
pub(crate) fn retry_delay(budget: u32, remaining: u32) -> Duration {
    Duration::from_secs(u64::from(budget - remaining + 1) * DELAY_FACTOR)
}

/// Handle wrapping operations with session liveness checks and bounded
/// retries. Created through [`GeminiClient::with_retry`].
///
/// Only [`GeminiError::Api`](crate::GeminiError::Api) is retried; auth
/// failures, timeouts and transport errors propagate immediately.
#[derive(Clone)]
pub struct Retry {
    client: GeminiClient,
    budget: u32,
}

impl Retry {
    pub(crate) fn new(client: GeminiClient, budget: u32) -> Self {
        Self { client, budget }
    }

    /// Run a single-result operation, retrying recoverable failures.
    ///
    /// The client is (re)initialized before each attempt if it is not
    /// running; a recoverable failure sleeps the computed backoff and
    /// tries again until the budget is exhausted, then the last error is
    /// returned unmodified.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut remaining = self.budget;

        loop {
            let result = match self.client.ensure_running("retried operation").await {
                Ok(()) => op().await,
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_recoverable() && remaining > 0 => {
                    let delay = retry_delay(self.budget, remaining);
                    tracing::warn!(
                        error = %e,
                        remaining,
                        delay_secs = delay.as_secs(),
                        "Recoverable error, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    remaining -= 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run a sequence-producing operation, retrying recoverable failures.
    ///
    /// On a recoverable failure the operation is restarted from scratch
    /// after the backoff; items already yielded are not replayed, so a
    /// consumer may observe a restart mid-sequence. This is deliberate
    /// at-most-once-per-attempt delivery, not exactly-once.
    pub fn stream<T, S, F>(&self, mut op: F) -> impl Stream<Item = Result<T>>
    where
        F: FnMut() -> S,
        S: Stream<Item = Result<T>>,
    {
        let client = self.client.clone();
        let budget = self.budget;

        stream! {
            let mut remaining = budget;

            'attempt: loop {
                match client.ensure_running("streamed operation").await {
                    Ok(()) => {}
                    Err(e) if e.is_recoverable() && remaining > 0 => {
                        let delay = retry_delay(budget, remaining);
                        tracing::warn!(
                            error = %e,
                            remaining,
                            delay_secs = delay.as_secs(),
                            "Recoverable error before stream start, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        remaining -= 1;
                        continue 'attempt;
                    }
                    Err(e) => {
                        yield Err(e);
                        break 'attempt;
                    }
                }

                let inner = op();
                pin_mut!(inner);

                loop {
                    match inner.next().await {
                        Some(Ok(value)) => yield Ok(value),
                        Some(Err(e)) if e.is_recoverable() && remaining > 0 => {
                            let delay = retry_delay(budget, remaining);
                            tracing::warn!(
                                error = %e,
                                remaining,
                                delay_secs = delay.as_secs(),
                                "Recoverable error mid-stream, restarting after backoff"
                            );
                            tokio::time::sleep(delay).await;
                            remaining -= 1;
                            continue 'attempt;
                        }
                        Some(Err(e)) => {
                            yield Err(e);
                            break 'attempt;
                        }
                        None => break 'attempt,
                    }
                }
            }
        }
    }
}
