//! Readiness gate: poll a dependency until it answers or the budget runs out.
//!
//! The policy is a plain linear poll with a constant pause between attempts.
//! It is meant for a low-frequency batch job where the database container may
//! still be starting up when the first trigger fires.

use std::{fmt::Display, future::Future, time::Duration};

use tracing::{info, warn};

/// How long to keep knocking before declaring the dependency unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Total number of probe attempts, at least 1.
    pub max_attempts: u32,
    /// Pause after each failed attempt (except the last).
    pub delay: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self { max_attempts: 15, delay: Duration::from_secs(1) }
    }
}

/// The probe never succeeded within the attempt budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unavailable {
    pub attempts: u32,
    pub last_error: String,
}

/// Run `probe` until it succeeds, at most `policy.max_attempts` times.
///
/// Per-attempt failures are logged and swallowed. On success the value is
/// returned at once, with no further waiting.
pub async fn await_ready<T, E, F, Fut>(
    mut probe: F,
    policy: &ReadinessPolicy,
) -> Result<T, Unavailable>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match probe().await {
            Ok(ready) => {
                info!(attempt, "dependency is ready");
                return Ok(ready);
            }
            Err(e) => {
                warn!(attempt, max_attempts, error = %e, "dependency not ready yet");
                last_error = e.to_string();
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    Err(Unavailable { attempts: max_attempts, last_error })
}
