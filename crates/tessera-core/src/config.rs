//! Layer configuration
//!
//! Loaded from TOML. Every section has defaults so an empty document is a
//! valid configuration.
//!
//! ```toml
//! [identifier]
//! min = 100000
//! max = 999999
//! max_attempts = 32
//!
//! [logging]
//! profile = "production"
//! filter = "tessera=info,tessera_store=warn"
//! ```

use crate::errors::{Result, TesseraError};
use crate::logging_facility::Profile;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Inclusive numeric range and attempt cap for public identifier minting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    pub min: u64,
    pub max: u64,
    pub max_attempts: u32,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            min: 100_000,
            max: 999_999,
            max_attempts: 32,
        }
    }
}

impl IdentifierConfig {
    /// Check `min <= max` and `max_attempts >= 1`
    ///
    /// # Errors
    ///
    /// Returns `TesseraError::Config` naming the offending bound.
    pub fn validate(&self) -> Result<()> {
        if self.min > self.max {
            return Err(TesseraError::Config {
                message: format!(
                    "identifier.min ({}) must not exceed identifier.max ({})",
                    self.min, self.max
                ),
            });
        }
        if self.max_attempts == 0 {
            return Err(TesseraError::Config {
                message: "identifier.max_attempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub profile: Profile,
    /// `EnvFilter` directive; falls back to the profile default
    pub filter: Option<String>,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub identifier: IdentifierConfig,
    pub logging: LoggingConfig,
}

impl CoreConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns `TesseraError::Config` on malformed TOML or invalid bounds.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: CoreConfig = toml::from_str(source).map_err(|e| TesseraError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    ///
    /// Returns `TesseraError::Config` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| TesseraError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&source)
    }

    /// # Errors
    ///
    /// Returns the first failing section check.
    pub fn validate(&self) -> Result<()> {
        self.identifier.validate()
    }
}
