//! Matcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::matcher::DelayStrategy;

/// Configuration for `StoreSubscriptionMatcher`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatcherConfig {
    /// Milliseconds to wait before each match query. 0 disables the delay.
    pub pre_match_delay_ms: u64,
}

impl MatcherConfig {
    /// Upper bound on the pre-match delay.
    pub const MAX_PRE_MATCH_DELAY: Duration = Duration::from_secs(60);

    /// Sets the pre-match delay, rounded up to whole milliseconds so any
    /// non-zero delay stays enabled.
    #[must_use]
    pub fn with_pre_match_delay(mut self, delay: Duration) -> Self {
        let millis = delay.as_nanos().div_ceil(1_000_000);
        self.pre_match_delay_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    /// The delay strategy this configuration selects.
    #[must_use]
    pub const fn pre_match_delay(&self) -> DelayStrategy {
        if self.pre_match_delay_ms == 0 {
            DelayStrategy::None
        } else {
            DelayStrategy::Fixed(Duration::from_millis(self.pre_match_delay_ms))
        }
    }

    /// Checks the configuration is usable.
    ///
    /// # Errors
    /// `ConfigError::Invalid` if the delay exceeds `MAX_PRE_MATCH_DELAY`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pre_match_delay().duration() > Self::MAX_PRE_MATCH_DELAY {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "pre_match_delay_ms {} exceeds maximum of {}",
                    self.pre_match_delay_ms,
                    Self::MAX_PRE_MATCH_DELAY.as_millis()
                ),
            });
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    /// `ConfigError::Parse` for malformed JSON or unknown fields,
    /// `ConfigError::Invalid` if validation fails.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}
