use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::PositionOptions;
use crate::{DEFAULT_MESSAGING_BASE_URL, SOS_STAGGER_MS, SOS_SUCCESS_DISPLAY_MS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid messaging base url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{0}")]
    Validation(String),
}

/// Runtime tunables pushed in by the shell. Every field has a default, so a
/// shell can send `{}` or only the values it wants to override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub tracking: PositionOptions,
    pub sos_location: PositionOptions,
    pub sos_stagger_ms: u64,
    pub sos_success_display_ms: u64,
    pub messaging_base_url: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            tracking: PositionOptions::tracking(),
            sos_location: PositionOptions::one_shot(),
            sos_stagger_ms: SOS_STAGGER_MS,
            sos_success_display_ms: SOS_SUCCESS_DISPLAY_MS,
            messaging_base_url: DEFAULT_MESSAGING_BASE_URL.to_owned(),
        }
    }
}

impl CoreConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracking.timeout_ms == 0 {
            return Err(ConfigError::Validation("tracking.timeout_ms must be > 0".into()));
        }
        if self.sos_location.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "sos_location.timeout_ms must be > 0".into(),
            ));
        }
        if self.sos_success_display_ms == 0 {
            return Err(ConfigError::Validation(
                "sos_success_display_ms must be > 0".into(),
            ));
        }

        let base = url::Url::parse(&self.messaging_base_url)?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "messaging_base_url must be http(s), got {}",
                base.scheme()
            )));
        }

        Ok(())
    }
}
