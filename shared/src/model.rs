use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capabilities::RawPosition;
use crate::config::CoreConfig;
use crate::safety::{self, ColorToken, SafetyClass, SafetyTier};
use crate::sos::SosDispatcher;
use crate::tracking::TrackingController;

// --- Typed IDs ---

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Explicit timestamp unit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

// --- Coordinate: validated, NaN-safe ---

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("coordinate is not finite")]
    NonFinite,
    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("invalid accuracy: {0}")]
    InvalidAccuracy(f64),
}

/// Wire form of a coordinate, as sent by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LatLng", into = "LatLng")]
pub struct Coordinate {
    lat: f64,
    lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(CoordinateError::NonFinite);
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }

    #[must_use]
    pub const fn lat(self) -> f64 {
        self.lat
    }

    #[must_use]
    pub const fn lng(self) -> f64 {
        self.lng
    }

    #[must_use]
    pub fn distance_to(self, other: Self) -> f64 {
        crate::geo::haversine_distance(self, other)
    }
}

impl TryFrom<LatLng> for Coordinate {
    type Error = CoordinateError;

    fn try_from(value: LatLng) -> Result<Self, Self::Error> {
        Self::new(value.lat, value.lng)
    }
}

impl From<Coordinate> for LatLng {
    fn from(coord: Coordinate) -> Self {
        Self {
            lat: coord.lat,
            lng: coord.lng,
        }
    }
}

// --- Position samples ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionSample {
    pub coordinate: Coordinate,
    pub accuracy_m: f64,
    pub captured_at: UnixTimeMs,
}

impl TryFrom<RawPosition> for PositionSample {
    type Error = CoordinateError;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        if !raw.accuracy.is_finite() || raw.accuracy < 0.0 {
            return Err(CoordinateError::InvalidAccuracy(raw.accuracy));
        }
        Ok(Self {
            coordinate: Coordinate::new(raw.lat, raw.lng)?,
            accuracy_m: raw.accuracy,
            captured_at: UnixTimeMs(raw.timestamp_ms),
        })
    }
}

// --- Routes (owned by the search collaborator) ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyFactor {
    pub name: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub waypoints: Vec<Coordinate>,
    #[serde(default)]
    pub safety_score: i64,
    #[serde(default)]
    pub safety_factors: Vec<SafetyFactor>,
    #[serde(default)]
    pub distance: String,
    #[serde(default)]
    pub duration: String,
}

impl Route {
    /// The last waypoint, if the route has any geometry at all.
    #[must_use]
    pub fn destination(&self) -> Option<Coordinate> {
        self.waypoints.last().copied()
    }

    #[must_use]
    pub fn safety(&self) -> SafetyClass {
        safety::classify(self.safety_score)
    }

    /// GeoJSON geometry for the map surface. Positions are `[lng, lat]`.
    #[must_use]
    pub fn geometry(&self) -> Option<geojson::Geometry> {
        let mut positions: Vec<Vec<f64>> = self
            .waypoints
            .iter()
            .map(|wp| vec![wp.lng(), wp.lat()])
            .collect();

        match positions.len() {
            0 => None,
            1 => positions
                .pop()
                .map(|point| geojson::Geometry::new(geojson::Value::Point(point))),
            _ => Some(geojson::Geometry::new(geojson::Value::LineString(positions))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteSearch {
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub routes: Vec<Route>,
}

// --- Contacts & session (owned by the account collaborators) ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub id: String,
    pub name: String,
    #[serde(alias = "phoneNumber")]
    pub phone: String,
    #[serde(default)]
    pub relation: Option<String>,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: Option<UserId>,
    pub token: Option<String>,
}

impl AuthSession {
    pub fn signed_in(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: Some(UserId::new(user_id)),
            token: Some(token.into()),
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some() && self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("user_id", &self.user_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSupport {
    pub geolocation: bool,
}

impl Default for PlatformSupport {
    fn default() -> Self {
        Self { geolocation: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Navigation {
    ContactManagement,
}

// --- Model ---

#[derive(Debug, Default)]
pub struct Model {
    pub config: CoreConfig,
    pub platform: PlatformSupport,
    pub session: AuthSession,
    pub contacts: Vec<EmergencyContact>,
    pub search: Option<RouteSearch>,
    pub selected_route: Option<usize>,
    pub tracking: TrackingController,
    pub sos: SosDispatcher,
    pub sos_banner: Option<String>,
    pub show_no_contacts_prompt: bool,
    pub pending_navigation: Option<Navigation>,
}

impl Model {
    #[must_use]
    pub fn active_route(&self) -> Option<&Route> {
        let index = self.selected_route?;
        self.search.as_ref()?.routes.get(index)
    }

    /// Origin and destination labels of the current search.
    #[must_use]
    pub fn route_labels(&self) -> (String, String) {
        self.search.as_ref().map_or_else(
            || ("Unknown".to_owned(), "Unknown".to_owned()),
            |search| (search.origin.clone(), search.destination.clone()),
        )
    }
}

// --- View model ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteCardView {
    pub index: usize,
    pub name: String,
    pub safety_score: u8,
    pub tier: SafetyTier,
    pub tier_label: String,
    pub color_token: ColorToken,
    pub distance: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorView {
    pub name: String,
    pub score: u8,
    pub color_token: ColorToken,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDetailView {
    pub card: RouteCardView,
    pub origin_label: String,
    pub dest_label: String,
    pub factors: Vec<FactorView>,
    pub geometry: Option<geojson::Geometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionView {
    pub lat: f64,
    pub lng: f64,
    pub lat_text: String,
    pub lng_text: String,
    pub accuracy_text: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TrackingView {
    pub active: bool,
    /// Active but no fix received yet.
    pub acquiring: bool,
    pub error: Option<String>,
    pub position: Option<PositionView>,
    pub distance_to_destination: Option<String>,
    pub distance_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SosPhase {
    #[default]
    Idle,
    Sending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SosView {
    pub phase: SosPhase,
    pub button_enabled: bool,
    pub banner: Option<String>,
    pub show_no_contacts_prompt: bool,
    pub contact_count: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ViewModel {
    pub routes: Vec<RouteCardView>,
    pub active_route: Option<RouteDetailView>,
    pub tracking: TrackingView,
    pub sos: SosView,
    pub navigation: Option<Navigation>,
}
