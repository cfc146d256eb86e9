// lib.rs - GoSafe live tracking & SOS core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod app;
pub mod capabilities;
pub mod config;
pub mod event;
pub mod geo;
pub mod model;
pub mod safety;
pub mod sos;
pub mod tracking;

use serde::{Deserialize, Serialize};

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use config::{ConfigError, CoreConfig};
pub use crux_core::App as CruxApp;
pub use event::Event;
pub use model::{
    AuthSession, Coordinate, CoordinateError, EmergencyContact, Model, Navigation,
    PositionSample, Route, RouteSearch, SafetyFactor, UnixTimeMs, UserId, ViewModel,
};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const MAX_EMERGENCY_CONTACTS: usize = 5;

pub const TRACKING_TIMEOUT_MS: u64 = 10_000;
pub const TRACKING_MAX_SAMPLE_AGE_MS: u64 = 5_000;
pub const SOS_LOCATION_TIMEOUT_MS: u64 = 8_000;
pub const SOS_STAGGER_MS: u64 = 800;
pub const SOS_SUCCESS_DISPLAY_MS: u64 = 5_000;

pub const DEFAULT_MESSAGING_BASE_URL: &str = "https://wa.me/";
pub const MAPS_QUERY_BASE_URL: &str = "https://maps.google.com/?q=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    CapabilityUnavailable,
    PermissionDenied,
    Timeout,
    PositionUnavailable,
    NoContactsConfigured,
    NotAuthenticated,
    ConcurrentDispatchRejected,
    InvalidInput,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::CapabilityUnavailable => "CAPABILITY_UNAVAILABLE",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Timeout => "TIMEOUT",
            Self::PositionUnavailable => "POSITION_UNAVAILABLE",
            Self::NoContactsConfigured => "NO_CONTACTS_CONFIGURED",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::ConcurrentDispatchRejected => "ALREADY_SENDING",
            Self::InvalidInput => "INVALID_INPUT",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn user_facing_message(self) -> &'static str {
        match self {
            Self::CapabilityUnavailable => "Geolocation not supported.",
            // Timeouts on the live stream are reported the same way as a denial.
            Self::PermissionDenied | Self::Timeout | Self::PositionUnavailable => {
                "Location access denied."
            }
            Self::NoContactsConfigured => {
                "You haven't added any emergency contacts yet. Go to your profile to add a friend or family member's WhatsApp number."
            }
            Self::NotAuthenticated => "Sign in to use SOS.",
            Self::ConcurrentDispatchRejected => "SOS is already sending.",
            Self::InvalidInput => "Some of the data received was invalid.",
            Self::Internal => "An unexpected error occurred. Please try again.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
