//! Pre-match delay.
//!
//! Some deployments want the store to settle before a match runs. The delay
//! is an injected strategy owned by the matcher instance, not process state.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{MatchError, MatchStage, SubmatchResult};

use super::cancel::CancelToken;

/// How long to wait before each query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayStrategy {
    /// Query immediately.
    #[default]
    None,
    /// Wait a fixed duration before querying.
    Fixed(Duration),
}

impl DelayStrategy {
    /// The conventional settle delay for deployments that enable one.
    pub const DEFAULT_FIXED: Duration = Duration::from_secs(2);

    /// A fixed delay of `DEFAULT_FIXED`.
    #[must_use]
    pub const fn fixed_default() -> Self {
        Self::Fixed(Self::DEFAULT_FIXED)
    }

    /// Zero for `None`.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => *d,
        }
    }

    /// False when the delay is zero.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !self.duration().is_zero()
    }

    /// Waits out the delay.
    ///
    /// # Errors
    /// `MatchError::Cancelled` if `cancel` fires before or during the wait.
    pub fn wait(&self, cancel: &CancelToken) -> SubmatchResult<()> {
        if cancel.is_cancelled() {
            return Err(MatchError::cancelled(MatchStage::Delay));
        }
        if !self.is_enabled() {
            return Ok(());
        }

        let duration = self.duration();
        trace!(delay_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX), "waiting before match query");
        if cancel.sleep(duration) {
            Ok(())
        } else {
            Err(MatchError::cancelled(MatchStage::Delay))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn none_is_default_and_disabled() {
        let d = DelayStrategy::default();
        assert_eq!(d, DelayStrategy::None);
        assert!(!d.is_enabled());
        assert_eq!(d.duration(), Duration::ZERO);
        assert!(d.wait(&CancelToken::never()).is_ok());
    }

    #[test]
    fn zero_fixed_is_disabled() {
        assert!(!DelayStrategy::Fixed(Duration::ZERO).is_enabled());
    }

    #[test]
    fn fixed_default_is_two_seconds() {
        assert_eq!(DelayStrategy::fixed_default().duration(), Duration::from_secs(2));
    }

    #[test]
    fn fixed_waits_at_least_duration() {
        let d = DelayStrategy::Fixed(Duration::from_millis(15));
        let started = Instant::now();
        d.wait(&CancelToken::never()).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn pre_cancelled_token_fails_even_without_delay() {
        let (canceller, token) = CancelToken::new();
        canceller.cancel();
        let err = DelayStrategy::None.wait(&token).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn cancel_during_wait_returns_promptly() {
        let (canceller, token) = CancelToken::new();
        let handle = std::thread::spawn(move || {
            let started = Instant::now();
            let result = DelayStrategy::Fixed(Duration::from_secs(30)).wait(&token);
            (result, started.elapsed())
        });
        std::thread::sleep(Duration::from_millis(20));
        canceller.cancel();

        let (result, elapsed) = handle.join().unwrap();
        assert!(matches!(
            result,
            Err(MatchError::Cancelled {
                stage: MatchStage::Delay
            })
        ));
        assert!(elapsed < Duration::from_secs(5));
    }
}
