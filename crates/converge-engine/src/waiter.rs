//! Bounded poll-until-terminal-state helper
//!
//! Wraps a cloud mutation whose effect is not immediately visible: after the
//! mutating call, poll a resource-specific status check on an exponential
//! backoff schedule until it reports a terminal state or the deadline
//! expires. Exceeding the deadline is a transient error, never a silent
//! success.

use crate::error::{EngineError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Polling schedule: exponential backoff between a minimum and maximum
/// delay, bounded by a total wait budget
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WaitConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_wait_ms: u64,
    pub multiplier: f64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_wait_ms: 300_000,
            multiplier: 2.0,
        }
    }
}

impl WaitConfig {
    /// Delay before the given retry attempt, capped at the maximum
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        (delay as u64).min(self.max_delay_ms)
    }
}

/// Outcome of one status poll, classified by the calling mapper
#[derive(Debug, Clone, PartialEq)]
pub enum WaitState<T> {
    /// Terminal state observed
    Ready(T),
    /// Provider still converging; poll again
    Pending,
}

/// Poll `check` until it reports a terminal state or the wait budget runs
/// out. Errors from `check` propagate immediately; a spent budget becomes
/// [`EngineError::WaitTimeout`].
pub async fn wait_until<T, F, Fut>(config: &WaitConfig, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<WaitState<T>>>,
{
    let started = Instant::now();
    let deadline = started + Duration::from_millis(config.max_wait_ms);
    let mut attempt: u32 = 0;
    loop {
        match check().await? {
            WaitState::Ready(value) => return Ok(value),
            WaitState::Pending => {}
        }
        let delay = Duration::from_millis(config.delay_for_attempt(attempt));
        attempt += 1;
        if Instant::now() + delay >= deadline {
            return Err(EngineError::WaitTimeout {
                waited_ms: started.elapsed().as_millis() as u64,
            });
        }
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "waiting for terminal state");
        sleep(delay).await;
    }
}
