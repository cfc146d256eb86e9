//! Live tracking session.
//!
//! `TrackingController` owns the only live position subscription for the
//! current route view. The subscription handle lives inside
//! `TrackingStatus::Active`, so a session is active exactly when a handle
//! exists. Every exit path (explicit stop, stream error, route change, view
//! teardown) goes through `stop` on the `GeoStream`.

use tracing::{debug, info, instrument, warn};

use crate::capabilities::{GeoError, GeoStream, PositionOptions, WatchId};
use crate::geo::format_distance;
use crate::model::{Coordinate, PositionSample, Route};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrackingStatus {
    #[default]
    Idle,
    Active(WatchId),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackingSession {
    pub status: TrackingStatus,
    pub last_sample: Option<PositionSample>,
    pub distance_to_destination: Option<String>,
    last_seq: u64,
}

impl TrackingSession {
    fn active(watch_id: WatchId) -> Self {
        Self {
            status: TrackingStatus::Active(watch_id),
            ..Self::default()
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            status: TrackingStatus::Error(message.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            TrackingStatus::Error(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct TrackingController {
    session: TrackingSession,
    destination: Option<Coordinate>,
    options: PositionOptions,
    next_watch: u64,
}

impl Default for TrackingController {
    fn default() -> Self {
        Self::new(PositionOptions::tracking())
    }
}

impl TrackingController {
    #[must_use]
    pub fn new(options: PositionOptions) -> Self {
        Self {
            session: TrackingSession::default(),
            destination: None,
            options,
            next_watch: 0,
        }
    }

    #[must_use]
    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    #[must_use]
    pub fn active_watch(&self) -> Option<WatchId> {
        match self.session.status {
            TrackingStatus::Active(watch_id) => Some(watch_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active_watch().is_some()
    }

    #[must_use]
    pub fn destination(&self) -> Option<Coordinate> {
        self.destination
    }

    /// Takes effect on the next `start`.
    pub fn set_options(&mut self, options: PositionOptions) {
        self.options = options;
    }

    /// Bind the controller to a new route view. Any running session belongs
    /// to the previous view and is torn down first.
    pub fn attach_route<G: GeoStream>(&mut self, geo: &G, route: Option<&Route>) {
        self.teardown(geo);
        self.destination = route.and_then(Route::destination);
    }

    #[instrument(skip(self, geo), fields(active = self.is_active()))]
    pub fn toggle<G: GeoStream>(&mut self, geo: &G) -> &TrackingStatus {
        match self.session.status {
            TrackingStatus::Active(watch_id) => {
                geo.stop(watch_id);
                self.session = TrackingSession::default();
                info!(%watch_id, "tracking stopped");
            }
            TrackingStatus::Idle | TrackingStatus::Error(_) => {
                self.next_watch += 1;
                let watch_id = WatchId(self.next_watch);

                match geo.start(watch_id, self.options) {
                    Ok(()) => {
                        self.session = TrackingSession::active(watch_id);
                        info!(%watch_id, "tracking started");
                    }
                    Err(e) => {
                        warn!(error = %e, "tracking could not start");
                        self.session = TrackingSession::failed(e.kind().user_facing_message());
                    }
                }
            }
        }
        &self.session.status
    }

    /// Apply a sample. Returns `false` when it was discarded as stale.
    pub fn on_sample(&mut self, watch_id: WatchId, seq: u64, sample: PositionSample) -> bool {
        if self.active_watch() != Some(watch_id) {
            debug!(%watch_id, seq, "dropping sample for inactive watch");
            return false;
        }
        if seq <= self.session.last_seq {
            debug!(%watch_id, seq, last = self.session.last_seq, "dropping out-of-order sample");
            return false;
        }

        self.session.last_seq = seq;
        self.session.distance_to_destination = self
            .destination
            .map(|dest| format_distance(sample.coordinate.distance_to(dest)));
        self.session.last_sample = Some(sample);
        true
    }

    /// Stream errors are terminal for the session; the user has to toggle
    /// again to retry. Returns `false` for errors from a stale watch.
    #[instrument(skip(self, geo))]
    pub fn on_error<G: GeoStream>(&mut self, geo: &G, watch_id: WatchId, error: &GeoError) -> bool {
        if self.active_watch() != Some(watch_id) {
            debug!(%watch_id, "ignoring error for inactive watch");
            return false;
        }

        geo.stop(watch_id);
        warn!(%watch_id, error = %error, "tracking stream failed");
        self.session = TrackingSession::failed(error.kind().user_facing_message());
        true
    }

    /// Mandatory cleanup when the owning view goes away.
    pub fn teardown<G: GeoStream>(&mut self, geo: &G) {
        if let Some(watch_id) = self.active_watch() {
            geo.stop(watch_id);
            info!(%watch_id, "tracking torn down");
        }
        self.session = TrackingSession::default();
    }
}
