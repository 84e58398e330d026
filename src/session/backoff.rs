use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Outcome of one attempt inside [`retry_notify`].
#[derive(Debug)]
pub enum RetryError<E> {
    /// Sleep and try again while the budget lasts.
    Transient(E),
    /// Stop and return immediately, whatever budget remains.
    Permanent(E),
}

/// Exponential backoff with jitter and a cap on total elapsed time.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub(crate) initial_interval: Duration,
    pub(crate) multiplier: f64,
    pub(crate) max_interval: Duration,
    pub(crate) max_elapsed: Duration,
    pub(crate) randomization_factor: f64,
}

impl Default for BackoffPolicy {
    /// 500ms initial delay growing by 1.5x, giving up 60s after the first attempt.
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed: Duration::from_secs(60),
            randomization_factor: 0.5,
        }
    }
}

/// Floor for the first retry delay.
pub const MIN_INITIAL_INTERVAL: Duration = Duration::from_millis(1);

impl BackoffPolicy {
    /// First retry delay, clamped to at least [`MIN_INITIAL_INTERVAL`].
    #[must_use]
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval.max(MIN_INITIAL_INTERVAL);
        self
    }

    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    #[must_use]
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Wall-clock time after the first attempt past which no retry starts.
    #[must_use]
    pub fn with_max_elapsed(mut self, budget: Duration) -> Self {
        self.max_elapsed = budget;
        self
    }

    /// Jitter as a fraction of each delay, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_interval.as_secs_f64() * self.multiplier.powi(exp);
        let capped = base.min(self.max_interval.as_secs_f64());

        if self.randomization_factor == 0.0 {
            return Duration::from_secs_f64(capped);
        }
        let spread = capped * self.randomization_factor;
        let jittered = rand::rng().random_range((capped - spread)..=(capped + spread));
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Runs `op` until it succeeds, fails permanently, or the policy's time
/// budget is spent.
///
/// The budget is wall-clock time measured from the first attempt, so time
/// spent inside failing attempts counts as well as the sleeps between them.
/// `notify` sees each transient error with the delay about to be slept. When
/// the budget runs out the last transient error is returned.
pub async fn retry_notify<T, E, Op, Fut, N>(
    policy: &BackoffPolicy,
    mut op: Op,
    mut notify: N,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError<E>>>,
    N: FnMut(&E, Duration),
{
    let started = Instant::now();
    let mut attempt = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(RetryError::Permanent(e)) => return Err(e),
            Err(RetryError::Transient(e)) => e,
        };

        let delay = policy.delay(attempt);
        if started.elapsed() + delay > policy.max_elapsed {
            return Err(err);
        }
        notify(&err, delay);
        tokio::time::sleep(delay).await;
        attempt = attempt.saturating_add(1);
    }
}
