use crux_core::capability::{Capability, CapabilityContext, Operation};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ErrorKind, SOS_LOCATION_TIMEOUT_MS, TRACKING_MAX_SAMPLE_AGE_MS, TRACKING_TIMEOUT_MS};

/// Handle of a live position subscription. Allocated by the core, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatchId(pub u64);

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    pub max_sample_age_ms: u64,
}

impl PositionOptions {
    #[must_use]
    pub const fn tracking() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: TRACKING_TIMEOUT_MS,
            max_sample_age_ms: TRACKING_MAX_SAMPLE_AGE_MS,
        }
    }

    #[must_use]
    pub const fn one_shot() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: SOS_LOCATION_TIMEOUT_MS,
            max_sample_age_ms: 0,
        }
    }
}

/// A position fix exactly as the platform reports it. Validated into a
/// `PositionSample` before it touches the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPosition {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: f64,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum GeoError {
    #[error("geolocation not available on this platform")]
    Unavailable,

    #[error("location permission denied by user")]
    PermissionDenied,

    #[error("location request timed out")]
    Timeout,

    #[error("position unavailable: {message}")]
    PositionUnavailable { message: String },
}

impl GeoError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable => ErrorKind::CapabilityUnavailable,
            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::Timeout => ErrorKind::Timeout,
            Self::PositionUnavailable { .. } => ErrorKind::PositionUnavailable,
        }
    }
}

pub type GeoResult = Result<RawPosition, GeoError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", content = "data")]
pub enum GeolocationOperation {
    /// Stream fixes until `ClearWatch` with the same id.
    Watch {
        watch_id: WatchId,
        options: PositionOptions,
    },
    ClearWatch {
        watch_id: WatchId,
    },
    /// Resolve exactly once within `options.timeout_ms`.
    GetCurrent {
        options: PositionOptions,
    },
}

impl Operation for GeolocationOperation {
    type Output = GeoResult;
}

/// The continuous-position contract the controllers depend on.
///
/// Results are delivered asynchronously by the implementation (as app events
/// for the shell adapter). `start` and `get_once` fail synchronously only when
/// the platform has no geolocation at all. `stop` must be idempotent.
pub trait GeoStream {
    fn start(&self, watch_id: WatchId, options: PositionOptions) -> Result<(), GeoError>;

    fn stop(&self, watch_id: WatchId);

    /// `ticket` is echoed back with the result so late answers can be matched
    /// against the request that caused them.
    fn get_once(&self, ticket: u64, options: PositionOptions) -> Result<(), GeoError>;
}

pub struct Geolocation<Ev> {
    context: CapabilityContext<GeolocationOperation, Ev>,
}

impl<Ev> Capability<Ev> for Geolocation<Ev> {
    type Operation = GeolocationOperation;
    type MappedSelf<MappedEv> = Geolocation<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Geolocation::new(self.context.map_event(f))
    }
}

impl<Ev> Geolocation<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<GeolocationOperation, Ev>) -> Self {
        Self { context }
    }

    /// Subscribe to position updates. Every delivery carries a per-watch
    /// sequence number starting at 1.
    pub fn watch<F>(&self, watch_id: WatchId, options: PositionOptions, make_event: F)
    where
        F: Fn(WatchId, u64, GeoResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let mut stream =
                context.stream_from_shell(GeolocationOperation::Watch { watch_id, options });
            let mut seq = 0u64;

            while let Some(result) = stream.next().await {
                seq += 1;
                context.update_app(make_event(watch_id, seq, result));
            }
        });
    }

    pub fn clear_watch(&self, watch_id: WatchId) {
        let context = self.context.clone();
        self.context.spawn(async move {
            context
                .notify_shell(GeolocationOperation::ClearWatch { watch_id })
                .await;
        });
    }

    pub fn get_current<F>(&self, options: PositionOptions, make_event: F)
    where
        F: FnOnce(GeoResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context
                .request_from_shell(GeolocationOperation::GetCurrent { options })
                .await;
            context.update_app(make_event(result));
        });
    }
}
