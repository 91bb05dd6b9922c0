//! Manager configuration.

use std::time::Duration;

/// Configuration of a [`PatchManager`](crate::PatchManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// How long a send waits for the server's response before retrying
    pub patch_timeout: Duration,

    /// Maximum number of queued patches consolidated into one request
    pub write_threshold: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            patch_timeout: Duration::from_secs(5),
            write_threshold: 64,
        }
    }
}

impl ManagerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PATCHSYNC_PATCH_TIMEOUT_MS`: response timeout in milliseconds
    /// - `PATCHSYNC_WRITE_THRESHOLD`: patches per request (at least 1)
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(timeout) = lookup(TIMEOUT_VAR) {
            let millis = timeout.trim().parse().map_err(|_| ConfigError::Invalid {
                variable: TIMEOUT_VAR,
                value: timeout.clone(),
            })?;
            config.patch_timeout = Duration::from_millis(millis);
        }

        if let Some(threshold) = lookup(THRESHOLD_VAR) {
            config.write_threshold = match threshold.trim().parse() {
                Ok(0) | Err(_) => {
                    return Err(ConfigError::Invalid {
                        variable: THRESHOLD_VAR,
                        value: threshold,
                    })
                }
                Ok(n) => n,
            };
        }

        Ok(config)
    }
}

const TIMEOUT_VAR: &str = "PATCHSYNC_PATCH_TIMEOUT_MS";
const THRESHOLD_VAR: &str = "PATCHSYNC_WRITE_THRESHOLD";

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable holds a value that cannot be used
    #[error("invalid {variable}: {value:?}")]
    Invalid {
        /// Variable name
        variable: &'static str,
        /// Offending value
        value: String,
    },
}
