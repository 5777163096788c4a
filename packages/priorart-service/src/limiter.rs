use std::time::Duration;

use tokio::time::{self, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

const MINUTE: Duration = Duration::from_secs(60);
const MAX_BACKOFF_DOUBLINGS: u32 = 2;

/// Periodic request gate: one permit per `60s / requests_per_minute`.
///
/// Owned by a single search run. The first permit is available immediately.
pub struct RateLimiter {
	interval: Interval,
}
impl RateLimiter {
	/// Must be called from within a Tokio runtime.
	pub fn new(requests_per_minute: u32) -> Self {
		let period = MINUTE / requests_per_minute.max(1);
		let mut interval = time::interval(period);

		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		Self { interval }
	}

	pub fn period(&self) -> Duration {
		self.interval.period()
	}

	pub async fn acquire(&mut self, cancel: &CancellationToken) -> Result<()> {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(Error::Cancelled),
			_ = self.interval.tick() => Ok(()),
		}
	}
}

pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<()> {
	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(Error::Cancelled),
		_ = time::sleep(duration) => Ok(()),
	}
}

/// `base`, `2 * base`, then `4 * base` for every later attempt.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
	base * 2_u32.pow(attempt.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_doubles_then_plateaus() {
		let base = Duration::from_secs(1);

		assert_eq!(backoff_delay(base, 1), Duration::from_secs(1));
		assert_eq!(backoff_delay(base, 2), Duration::from_secs(2));
		assert_eq!(backoff_delay(base, 3), Duration::from_secs(4));
		assert_eq!(backoff_delay(base, 9), Duration::from_secs(4));
	}

	#[tokio::test(start_paused = true)]
	async fn permits_are_spaced_by_period() {
		let cancel = CancellationToken::new();
		let mut limiter = RateLimiter::new(60);
		let start = time::Instant::now();

		limiter.acquire(&cancel).await.expect("First permit failed.");

		assert_eq!(start.elapsed(), Duration::ZERO);

		limiter.acquire(&cancel).await.expect("Second permit failed.");
		limiter.acquire(&cancel).await.expect("Third permit failed.");

		assert_eq!(limiter.period(), Duration::from_secs(1));
		assert_eq!(start.elapsed(), Duration::from_secs(2));
	}

	#[tokio::test(start_paused = true)]
	async fn cancelled_wait_returns_cancelled() {
		let cancel = CancellationToken::new();
		let mut limiter = RateLimiter::new(1);

		limiter.acquire(&cancel).await.expect("First permit failed.");
		cancel.cancel();

		assert!(matches!(limiter.acquire(&cancel).await, Err(Error::Cancelled)));
		assert!(matches!(
			sleep_or_cancel(Duration::from_secs(30), &cancel).await,
			Err(Error::Cancelled)
		));
	}
}
