//! Route safety classification.
//!
//! Scores come from the route search backend and are treated as opaque
//! integers. Anything outside `[0, 100]` is clamped before classification.

use serde::{Deserialize, Serialize};

pub const SAFE_THRESHOLD: u8 = 80;
pub const MODERATE_THRESHOLD: u8 = 60;

pub const FACTOR_GOOD_THRESHOLD: u8 = 70;
pub const FACTOR_FAIR_THRESHOLD: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyTier {
    Safe,
    Moderate,
    Caution,
}

impl SafetyTier {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Moderate => "MODERATE",
            Self::Caution => "CAUTION",
        }
    }

    #[must_use]
    pub const fn color_token(self) -> ColorToken {
        match self {
            Self::Safe => ColorToken::AccentGreen,
            Self::Moderate => ColorToken::AccentAmber,
            Self::Caution => ColorToken::AccentRed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorToken {
    AccentGreen,
    AccentAmber,
    AccentRed,
}

impl ColorToken {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccentGreen => "accent-green",
            Self::AccentAmber => "accent-amber",
            Self::AccentRed => "accent-red",
        }
    }
}

impl std::fmt::Display for ColorToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetyClass {
    pub score: u8,
    pub tier: SafetyTier,
    pub color_token: ColorToken,
}

#[must_use]
pub fn clamp_score(score: i64) -> u8 {
    // Lossless after the clamp.
    u8::try_from(score.clamp(0, 100)).unwrap_or(0)
}

#[must_use]
pub fn classify(score: i64) -> SafetyClass {
    let score = clamp_score(score);
    let tier = if score >= SAFE_THRESHOLD {
        SafetyTier::Safe
    } else if score >= MODERATE_THRESHOLD {
        SafetyTier::Moderate
    } else {
        SafetyTier::Caution
    };

    SafetyClass {
        score,
        tier,
        color_token: tier.color_token(),
    }
}

/// Colour band for an individual safety factor. Factors use softer
/// thresholds than the overall route score.
#[must_use]
pub fn factor_color(score: i64) -> ColorToken {
    let score = clamp_score(score);
    if score >= FACTOR_GOOD_THRESHOLD {
        ColorToken::AccentGreen
    } else if score >= FACTOR_FAIR_THRESHOLD {
        ColorToken::AccentAmber
    } else {
        ColorToken::AccentRed
    }
}
