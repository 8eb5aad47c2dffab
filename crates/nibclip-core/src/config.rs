//! Runtime configuration for nibclip operations

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Default upper bound on the processed window (1 GiB, buffered in memory)
pub const DEFAULT_MAX_SIZE: u64 = 1024 * 1024 * 1024;

/// Default suffix appended to the destination to name its backup
pub const DEFAULT_BACKUP_SUFFIX: &str = ".bak";

/// Bounds applied to the resolved read length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizePolicy {
    /// Require the length to be a power of two
    pub enforce_power_of_two: bool,

    /// Smallest accepted length in bytes
    pub min_size: u64,

    /// Largest accepted length in bytes
    pub max_size: u64,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self {
            enforce_power_of_two: false,
            min_size: 0,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl SizePolicy {
    /// Create a policy with defaults (any length up to [`DEFAULT_MAX_SIZE`])
    pub fn new() -> Self {
        Self::default()
    }

    /// Any length within `min..=max`
    pub fn bounded(min_size: u64, max_size: u64) -> Self {
        Self {
            enforce_power_of_two: false,
            min_size,
            max_size,
        }
    }

    /// Power-of-two lengths within `min..=max`, e.g. `power_of_two(32, 1024)`
    pub fn power_of_two(min_size: u64, max_size: u64) -> Self {
        Self {
            enforce_power_of_two: true,
            min_size,
            max_size,
        }
    }

    /// Set power-of-two enforcement
    pub fn enforce_power_of_two(mut self, enforce: bool) -> Self {
        self.enforce_power_of_two = enforce;
        self
    }

    /// Set the minimum length
    pub fn min_size(mut self, size: u64) -> Self {
        self.min_size = size;
        self
    }

    /// Set the maximum length
    pub fn max_size(mut self, size: u64) -> Self {
        self.max_size = size;
        self
    }

    /// Check a resolved length against this policy
    pub fn check(&self, size: u64) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidSize { size, reason };

        if self.min_size > self.max_size {
            return Err(ValidationError::InvalidConfiguration(format!(
                "size policy minimum {} exceeds maximum {}",
                self.min_size, self.max_size
            )));
        }
        if size < self.min_size {
            return Err(invalid(format!("must be at least {}", self.min_size)));
        }
        if size > self.max_size {
            return Err(invalid(format!("must be at most {}", self.max_size)));
        }
        if self.enforce_power_of_two && !size.is_power_of_two() {
            return Err(invalid("must be a power of two".to_string()));
        }
        Ok(())
    }
}

/// Main configuration struct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bounds on the processed window
    pub size_policy: SizePolicy,

    /// Suffix appended to the destination to name the backup
    pub backup_suffix: String,

    /// Delete an existing destination before the final rename when no backup was taken
    pub remove_before_swap: bool,

    /// Sync the temp file to disk before swapping it in
    pub sync_temp: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            size_policy: SizePolicy::default(),
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
            remove_before_swap: true,
            sync_temp: true,
        }
    }
}

impl Config {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size policy
    pub fn size_policy(mut self, policy: SizePolicy) -> Self {
        self.size_policy = policy;
        self
    }

    /// Set the backup suffix
    pub fn backup_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.backup_suffix = suffix.into();
        self
    }

    /// Set remove_before_swap
    pub fn remove_before_swap(mut self, remove: bool) -> Self {
        self.remove_before_swap = remove;
        self
    }

    /// Set sync_temp
    pub fn sync_temp(mut self, sync: bool) -> Self {
        self.sync_temp = sync;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.size_policy, SizePolicy::default());
        assert_eq!(config.backup_suffix, ".bak");
        assert!(config.remove_before_swap);
        assert!(config.sync_temp);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .size_policy(SizePolicy::power_of_two(32, 1024))
            .backup_suffix(".orig")
            .remove_before_swap(false)
            .sync_temp(false);

        assert!(config.size_policy.enforce_power_of_two);
        assert_eq!(config.backup_suffix, ".orig");
        assert!(!config.remove_before_swap);
        assert!(!config.sync_temp);
    }

    #[test]
    fn test_default_policy_accepts_any_size() {
        let policy = SizePolicy::default();
        assert!(policy.check(0).is_ok());
        assert!(policy.check(3).is_ok());
        assert!(policy.check(DEFAULT_MAX_SIZE).is_ok());
        assert!(policy.check(DEFAULT_MAX_SIZE + 1).is_err());
    }

    #[test]
    fn test_power_of_two_policy() {
        let policy = SizePolicy::power_of_two(32, 1024);
        for size in [32, 64, 128, 256, 512, 1024] {
            assert!(policy.check(size).is_ok(), "{size}");
        }
        for size in [0, 16, 33, 100, 2048] {
            assert!(
                matches!(policy.check(size), Err(ValidationError::InvalidSize { .. })),
                "{size}"
            );
        }
    }

    #[test]
    fn test_bounded_policy() {
        let policy = SizePolicy::bounded(32, 256);
        assert!(policy.check(100).is_ok());
        assert!(policy.check(31).is_err());
        assert!(policy.check(257).is_err());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let policy = SizePolicy::new().min_size(10).max_size(5);
        assert!(matches!(
            policy.check(7),
            Err(ValidationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_size_reason_in_message() {
        let err = SizePolicy::power_of_two(1, 64).check(48).unwrap_err();
        assert!(err.to_string().contains("power of two"));
    }
}
