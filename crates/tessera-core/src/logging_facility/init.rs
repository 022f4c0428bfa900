//! Logging initialization module
//!
//! Provides a single initialization point for the logging facility.

use crate::config::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Logging profile configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Human-readable output for development
    #[default]
    Development,
    /// JSON structured output for production
    Production,
    /// Test capture mode for deterministic testing
    Test,
}

impl Profile {
    /// Filter directive used when neither `RUST_LOG` nor config supplies one
    pub fn default_filter(&self) -> &'static str {
        match self {
            Profile::Development => "tessera=debug",
            Profile::Production => "tessera=info",
            Profile::Test => "off",
        }
    }
}

static INIT_ONCE: Once = Once::new();

/// Initialize the logging facility
///
/// This function should be called once at application startup.
/// It sets up the tracing subscriber based on the selected profile.
///
/// # Profiles
///
/// - **Development**: Human-readable logs with debug level
/// - **Production**: JSON structured logs with info level
/// - **Test**: Bare registry; use `init_test_capture()` to record events
///
/// # Example
///
/// ```
/// use tessera_core::logging_facility::{init, Profile};
///
/// init(Profile::Development);
/// ```
pub fn init(profile: Profile) {
    install(profile, None);
}

/// Initialize from a loaded `[logging]` config section
///
/// `RUST_LOG` still wins over the configured filter.
pub fn init_from_config(config: &LoggingConfig) {
    install(config.profile, config.filter.as_deref());
}

fn install(profile: Profile, filter: Option<&str>) {
    INIT_ONCE.call_once(|| {
        let directive = filter.unwrap_or(profile.default_filter()).to_string();
        let env_filter =
            || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

        // A subscriber installed elsewhere (e.g. test capture) takes precedence.
        let _ = match profile {
            Profile::Development => tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .finish()
                .try_init(),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_env_filter(env_filter())
                .finish()
                .try_init(),
            Profile::Test => tracing_subscriber::registry().try_init(),
        };
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_idempotent() {
        // Multiple calls should not panic
        init(Profile::Test);
        init(Profile::Test);
        init(Profile::Development);
    }

    #[test]
    fn test_profile_default_filters() {
        assert_eq!(Profile::Development.default_filter(), "tessera=debug");
        assert_eq!(Profile::Production.default_filter(), "tessera=info");
    }

    #[test]
    fn test_profile_deserializes_lowercase() {
        let profile: Profile = serde_json::from_str("\"production\"").unwrap();
        assert_eq!(profile, Profile::Production);
    }
}
