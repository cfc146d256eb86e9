//! SOS alert protocol.
//!
//! One attempt at a time: `Idle -> ResolvingLocation -> Dispatching ->
//! Succeeded -> Idle`. Location is best effort; an alert without a position
//! is still sent. Each contact gets its own messaging deep-link, opened by
//! the shell after a per-contact stagger so popup blockers let every one
//! through.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::capabilities::{GeoStream, PositionOptions};
use crate::config::CoreConfig;
use crate::model::{AuthSession, Coordinate, EmergencyContact};
use crate::{ErrorKind, MAPS_QUERY_BASE_URL, MAX_EMERGENCY_CONTACTS};

pub const LOCATION_UNAVAILABLE: &str = "Location unavailable";

/// Characters left bare by JavaScript's `encodeURIComponent`. Messaging
/// endpoints read `+` literally, so spaces must go out as `%20`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

// --- Contacts gate ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    Allowed,
    BlockedNoAuth,
    BlockedNoContacts,
}

#[must_use]
pub fn can_dispatch(session: &AuthSession, contacts: &[EmergencyContact]) -> GateDecision {
    if !session.is_authenticated() {
        return GateDecision::BlockedNoAuth;
    }
    if contacts.is_empty() {
        return GateDecision::BlockedNoContacts;
    }
    if contacts.len() > MAX_EMERGENCY_CONTACTS {
        warn!(count = contacts.len(), "contact list exceeds the account limit");
    }
    GateDecision::Allowed
}

// --- Attempt state ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SosAttemptId(pub u64);

impl std::fmt::Display for SosAttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sos-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SosStatus {
    #[default]
    Idle,
    ResolvingLocation,
    Dispatching,
    Succeeded,
    Failed(String),
}

impl SosStatus {
    /// Dispatch is serialized: nothing new starts while this is true.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::ResolvingLocation | Self::Dispatching)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SosAttempt {
    pub id: SosAttemptId,
    pub status: SosStatus,
    pub resolved_location: Option<Coordinate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SosRequest {
    pub origin_label: String,
    pub dest_label: String,
    pub contacts: Vec<EmergencyContact>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledOpen {
    pub contact_id: String,
    pub delay_ms: u64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub attempt: SosAttemptId,
    pub message: String,
    pub opens: Vec<ScheduledOpen>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SosStep {
    AwaitingLocation(SosAttemptId),
    Ready(DispatchPlan),
}

#[derive(Debug, Error)]
pub enum SosError {
    #[error("an SOS alert is already being sent")]
    AlreadySending,

    #[error("not signed in")]
    NotAuthenticated,

    #[error("no emergency contacts configured")]
    NoContactsConfigured,

    #[error("{0} is not waiting for a location")]
    Stale(SosAttemptId),

    #[error("invalid messaging link: {0}")]
    DeepLink(#[from] url::ParseError),
}

impl SosError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadySending => ErrorKind::ConcurrentDispatchRejected,
            Self::NotAuthenticated => ErrorKind::NotAuthenticated,
            Self::NoContactsConfigured => ErrorKind::NoContactsConfigured,
            Self::Stale(_) | Self::DeepLink(_) => ErrorKind::Internal,
        }
    }
}

// --- Message composition ---

#[must_use]
pub fn maps_link(location: Coordinate) -> String {
    format!("{MAPS_QUERY_BASE_URL}{},{}", location.lat(), location.lng())
}

/// The contact-facing alert text. Contacts' messaging clients match on the
/// literal emoji and labels, so the layout must not drift.
#[must_use]
pub fn compose_alert(location: Option<Coordinate>, origin_label: &str, dest_label: &str) -> String {
    let location_line = location.map_or_else(|| LOCATION_UNAVAILABLE.to_owned(), maps_link);
    format!(
        "🆘 *SOS ALERT from GoSafe*\n\n\
         I need help! I'm currently travelling and may be in danger.\n\n\
         📍 *My live location:*\n{location_line}\n\n\
         🛣️ *Route:* {origin_label} → {dest_label}\n\n\
         Please check on me immediately. This message was sent via GoSafe."
    )
}

#[must_use]
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// `<base><digits>?text=<message>`, with the message percent-encoded the
/// way `encodeURIComponent` does it.
pub fn messaging_link(
    base: &Url,
    phone_digits: &str,
    message: &str,
) -> Result<String, url::ParseError> {
    let mut link = base.join(phone_digits)?;
    link.set_query(None);
    link.set_fragment(None);
    Ok(format!(
        "{link}?text={}",
        utf8_percent_encode(message, URI_COMPONENT)
    ))
}

// --- Dispatcher ---

#[derive(Debug)]
pub struct SosDispatcher {
    attempt: SosAttempt,
    pending: Option<SosRequest>,
    expected_opens: usize,
    next_attempt: u64,
    stagger_ms: u64,
    messaging_base_url: String,
}

impl Default for SosDispatcher {
    fn default() -> Self {
        Self::new(&CoreConfig::default())
    }
}

impl SosDispatcher {
    #[must_use]
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            attempt: SosAttempt::default(),
            pending: None,
            expected_opens: 0,
            next_attempt: 0,
            stagger_ms: config.sos_stagger_ms,
            messaging_base_url: config.messaging_base_url.clone(),
        }
    }

    #[must_use]
    pub fn attempt(&self) -> &SosAttempt {
        &self.attempt
    }

    pub fn configure(&mut self, config: &CoreConfig) {
        self.stagger_ms = config.sos_stagger_ms;
        self.messaging_base_url.clone_from(&config.messaging_base_url);
    }

    /// Gate the request and start resolving the sender's location. When the
    /// platform cannot locate at all the plan is built straight away.
    #[instrument(skip_all, fields(contacts = request.contacts.len()))]
    pub fn begin<G: GeoStream>(
        &mut self,
        geo: &G,
        session: &AuthSession,
        request: SosRequest,
        options: PositionOptions,
    ) -> Result<SosStep, SosError> {
        if self.attempt.status.is_busy() {
            debug!(attempt = %self.attempt.id, "SOS already in progress");
            return Err(SosError::AlreadySending);
        }

        match can_dispatch(session, &request.contacts) {
            GateDecision::Allowed => {}
            GateDecision::BlockedNoAuth => return Err(SosError::NotAuthenticated),
            GateDecision::BlockedNoContacts => return Err(SosError::NoContactsConfigured),
        }

        self.next_attempt += 1;
        let id = SosAttemptId(self.next_attempt);
        self.attempt = SosAttempt {
            id,
            status: SosStatus::ResolvingLocation,
            resolved_location: None,
        };
        self.pending = Some(request);
        info!(attempt = %id, "SOS started");

        match geo.get_once(id.0, options) {
            Ok(()) => Ok(SosStep::AwaitingLocation(id)),
            Err(e) => {
                warn!(attempt = %id, error = %e, "sending SOS without location");
                self.resolve_location(id, None).map(SosStep::Ready)
            }
        }
    }

    /// Finish location resolution (with or without a fix) and build the
    /// fan-out plan. Late or duplicate answers yield `SosError::Stale`.
    #[instrument(skip(self))]
    pub fn resolve_location(
        &mut self,
        attempt: SosAttemptId,
        location: Option<Coordinate>,
    ) -> Result<DispatchPlan, SosError> {
        if self.attempt.id != attempt || self.attempt.status != SosStatus::ResolvingLocation {
            return Err(SosError::Stale(attempt));
        }
        let Some(request) = self.pending.take() else {
            return Err(SosError::Stale(attempt));
        };

        self.attempt.resolved_location = location;
        self.attempt.status = SosStatus::Dispatching;

        match self.plan(attempt, &request, location) {
            Ok(plan) => {
                self.expected_opens = plan.opens.len();
                info!(
                    attempt = %attempt,
                    contacts = plan.opens.len(),
                    located = location.is_some(),
                    "SOS dispatch planned"
                );
                Ok(plan)
            }
            Err(e) => {
                warn!(attempt = %attempt, error = %e, "SOS dispatch failed");
                self.attempt.status = SosStatus::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// The location deadline passed; go ahead without a fix unless one
    /// already arrived.
    pub fn expire_location(&mut self, attempt: SosAttemptId) -> Result<DispatchPlan, SosError> {
        self.resolve_location(attempt, None)
    }

    /// Record that the shell was handed `scheduled` opens. Success requires
    /// an open for every planned contact.
    pub fn mark_scheduled(&mut self, attempt: SosAttemptId, scheduled: usize) -> bool {
        if self.attempt.id != attempt || self.attempt.status != SosStatus::Dispatching {
            return false;
        }

        if scheduled < self.expected_opens {
            let reason = format!(
                "only {scheduled} of {} contacts were attempted",
                self.expected_opens
            );
            warn!(attempt = %attempt, %reason, "SOS dispatch incomplete");
            self.attempt.status = SosStatus::Failed(reason);
            return false;
        }

        self.attempt.status = SosStatus::Succeeded;
        info!(attempt = %attempt, "SOS dispatched");
        true
    }

    /// The success banner has been shown long enough. Stale timers from an
    /// older attempt are ignored.
    pub fn display_window_elapsed(&mut self, attempt: SosAttemptId) -> bool {
        if self.attempt.id == attempt && self.attempt.status == SosStatus::Succeeded {
            self.attempt.status = SosStatus::Idle;
            return true;
        }
        false
    }

    fn plan(
        &self,
        attempt: SosAttemptId,
        request: &SosRequest,
        location: Option<Coordinate>,
    ) -> Result<DispatchPlan, SosError> {
        let message = compose_alert(location, &request.origin_label, &request.dest_label);
        let base = Url::parse(&self.messaging_base_url)?;

        let opens = request
            .contacts
            .iter()
            .zip(0u64..)
            .map(|(contact, index)| -> Result<ScheduledOpen, SosError> {
                let phone = normalize_phone(&contact.phone);
                if phone.is_empty() {
                    warn!(contact = %contact.id, "contact has no dialable digits");
                }
                let link = messaging_link(&base, &phone, &message)?;
                Ok(ScheduledOpen {
                    contact_id: contact.id.clone(),
                    delay_ms: self.stagger_ms.saturating_mul(index),
                    url: link,
                })
            })
            .collect::<Result<Vec<_>, SosError>>()?;

        Ok(DispatchPlan {
            attempt,
            message,
            opens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::{FakeGeoStream, GeoCall};
    use assert_matches::assert_matches;

    fn contact(id: &str, phone: &str) -> EmergencyContact {
        EmergencyContact {
            id: id.into(),
            name: format!("Contact {id}"),
            phone: phone.into(),
            relation: None,
        }
    }

    fn request(contacts: Vec<EmergencyContact>) -> SosRequest {
        SosRequest {
            origin_label: "Connaught Place".into(),
            dest_label: "Hauz Khas".into(),
            contacts,
        }
    }

    fn three_contacts() -> Vec<EmergencyContact> {
        vec![
            contact("a", "+91 98765-43210"),
            contact("b", "(555) 123 4567"),
            contact("c", "44 20 7946 0958"),
        ]
    }

    fn session() -> AuthSession {
        AuthSession::signed_in("user-1", "jwt")
    }

    fn text_param(url: &str) -> String {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "text")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[test]
    fn test_gate_decisions() {
        let contacts = three_contacts();
        assert_eq!(can_dispatch(&AuthSession::default(), &contacts), GateDecision::BlockedNoAuth);
        assert_eq!(can_dispatch(&AuthSession::default(), &[]), GateDecision::BlockedNoAuth);
        assert_eq!(can_dispatch(&session(), &[]), GateDecision::BlockedNoContacts);
        assert_eq!(can_dispatch(&session(), &contacts), GateDecision::Allowed);
    }

    #[test]
    fn test_alert_template_with_location() {
        let location = Coordinate::new(28.65, 77.15).unwrap();
        let message = compose_alert(Some(location), "Connaught Place", "Hauz Khas");
        assert_eq!(
            message,
            "🆘 *SOS ALERT from GoSafe*\n\nI need help! I'm currently travelling and may be in danger.\n\n📍 *My live location:*\nhttps://maps.google.com/?q=28.65,77.15\n\n🛣️ *Route:* Connaught Place → Hauz Khas\n\nPlease check on me immediately. This message was sent via GoSafe."
        );
    }

    #[test]
    fn test_alert_template_without_location() {
        let message = compose_alert(None, "A", "B");
        assert!(message.contains("📍 *My live location:*\nLocation unavailable\n\n"));
        assert!(message.contains("🛣️ *Route:* A → B"));
    }

    #[test]
    fn test_normalize_phone_strips_everything_but_digits() {
        assert_eq!(normalize_phone("+91 98765-43210"), "919876543210");
        assert_eq!(normalize_phone("(555) 123 4567"), "5551234567");
        assert_eq!(normalize_phone("n/a"), "");
    }

    #[test]
    fn test_messaging_link_encodes_message() {
        let base = Url::parse("https://wa.me/").unwrap();
        let message = compose_alert(None, "A", "B");
        let link = messaging_link(&base, "919876543210", &message).unwrap();

        let parsed = Url::parse(&link).unwrap();
        assert_eq!(parsed.host_str(), Some("wa.me"));
        assert_eq!(parsed.path(), "/919876543210");
        assert_eq!(text_param(&link), message);
    }

    #[test]
    fn test_messaging_link_uses_uri_component_encoding() {
        let base = Url::parse("https://wa.me/").unwrap();
        let message = compose_alert(None, "Connaught Place", "Hauz Khas");
        let link = messaging_link(&base, "123", &message).unwrap();

        assert!(link.starts_with(
            "https://wa.me/123?text=%F0%9F%86%98%20*SOS%20ALERT%20from%20GoSafe*%0A%0AI%20need%20help!%20I'm%20currently"
        ));
        assert!(link.contains("Connaught%20Place%20%E2%86%92%20Hauz%20Khas"));
        assert!(!link.contains('+'));
        assert!(!link.contains(' '));
    }

    #[test]
    fn test_messaging_link_drops_base_query() {
        let base = Url::parse("https://api.example.com/send/?source=app#top").unwrap();
        let link = messaging_link(&base, "123", "hi there").unwrap();
        assert_eq!(link, "https://api.example.com/send/123?text=hi%20there");
    }

    #[test]
    fn test_three_contacts_are_staggered() {
        let geo = FakeGeoStream::default();
        let mut sos = SosDispatcher::default();

        let step = sos
            .begin(&geo, &session(), request(three_contacts()), PositionOptions::one_shot())
            .unwrap();
        assert_eq!(step, SosStep::AwaitingLocation(SosAttemptId(1)));
        assert_eq!(sos.attempt().status, SosStatus::ResolvingLocation);
        assert_eq!(geo.calls(), vec![GeoCall::GetOnce(1)]);

        let location = Coordinate::new(28.65, 77.15).unwrap();
        let plan = sos.resolve_location(SosAttemptId(1), Some(location)).unwrap();
        assert_eq!(sos.attempt().status, SosStatus::Dispatching);
        assert_eq!(sos.attempt().resolved_location, Some(location));

        let delays: Vec<u64> = plan.opens.iter().map(|o| o.delay_ms).collect();
        assert_eq!(delays, vec![0, 800, 1600]);
        assert!(plan.opens[0].url.starts_with("https://wa.me/919876543210?text="));
        assert!(plan.opens[1].url.starts_with("https://wa.me/5551234567?text="));
        assert!(text_param(&plan.opens[2].url).contains("https://maps.google.com/?q=28.65,77.15"));

        assert!(sos.mark_scheduled(plan.attempt, plan.opens.len()));
        assert_eq!(sos.attempt().status, SosStatus::Succeeded);
    }

    #[test]
    fn test_unavailable_location_still_dispatches_to_everyone() {
        let geo = FakeGeoStream::unavailable();
        let mut sos = SosDispatcher::default();

        let step = sos
            .begin(&geo, &session(), request(three_contacts()), PositionOptions::one_shot())
            .unwrap();

        let plan = assert_matches!(step, SosStep::Ready(plan) => plan);
        assert_eq!(plan.opens.len(), 3);
        assert_eq!(
            plan.opens.iter().map(|o| o.delay_ms).collect::<Vec<_>>(),
            vec![0, 800, 1600]
        );
        assert!(plan.message.contains(LOCATION_UNAVAILABLE));
        assert_eq!(sos.attempt().resolved_location, None);
    }

    #[test]
    fn test_location_deadline_proceeds_without_fix() {
        let geo = FakeGeoStream::default();
        let mut sos = SosDispatcher::default();
        sos.begin(&geo, &session(), request(three_contacts()), PositionOptions::one_shot())
            .unwrap();

        let plan = sos.expire_location(SosAttemptId(1)).unwrap();
        assert!(plan.message.contains(LOCATION_UNAVAILABLE));

        // The fix arriving after the deadline is ignored.
        let late = sos.resolve_location(SosAttemptId(1), Some(Coordinate::new(1.0, 1.0).unwrap()));
        assert_matches!(late, Err(SosError::Stale(SosAttemptId(1))));
        assert_eq!(sos.attempt().resolved_location, None);
    }

    #[test]
    fn test_concurrent_dispatch_is_rejected() {
        let geo = FakeGeoStream::default();
        let mut sos = SosDispatcher::default();
        sos.begin(&geo, &session(), request(three_contacts()), PositionOptions::one_shot())
            .unwrap();

        // While resolving.
        assert_matches!(
            sos.begin(&geo, &session(), request(three_contacts()), PositionOptions::one_shot()),
            Err(SosError::AlreadySending)
        );

        // While dispatching.
        let plan = sos.resolve_location(SosAttemptId(1), None).unwrap();
        assert_matches!(
            sos.begin(&geo, &session(), request(three_contacts()), PositionOptions::one_shot()),
            Err(SosError::AlreadySending)
        );
        assert_eq!(geo.calls(), vec![GeoCall::GetOnce(1)]);
        assert_eq!(sos.attempt().id, plan.attempt);
    }

    #[test]
    fn test_empty_contacts_never_dispatch() {
        let geo = FakeGeoStream::default();
        let mut sos = SosDispatcher::default();

        let result = sos.begin(&geo, &session(), request(vec![]), PositionOptions::one_shot());

        assert_matches!(result, Err(SosError::NoContactsConfigured));
        assert_eq!(sos.attempt().status, SosStatus::Idle);
        assert!(geo.calls().is_empty());
    }

    #[test]
    fn test_signed_out_user_is_blocked() {
        let geo = FakeGeoStream::default();
        let mut sos = SosDispatcher::default();

        let err = sos
            .begin(
                &geo,
                &AuthSession::default(),
                request(three_contacts()),
                PositionOptions::one_shot(),
            )
            .unwrap_err();

        assert_eq!(err.kind().user_facing_message(), "Sign in to use SOS.");
        assert!(geo.calls().is_empty());
    }

    #[test]
    fn test_success_rearms_after_display_window() {
        let geo = FakeGeoStream::unavailable();
        let mut sos = SosDispatcher::default();
        let plan = assert_matches!(
            sos.begin(&geo, &session(), request(three_contacts()), PositionOptions::one_shot()),
            Ok(SosStep::Ready(plan)) => plan
        );
        sos.mark_scheduled(plan.attempt, 3);

        // Re-invoking from Succeeded is allowed and starts a new attempt.
        let second = assert_matches!(
            sos.begin(&geo, &session(), request(three_contacts()), PositionOptions::one_shot()),
            Ok(SosStep::Ready(plan)) => plan
        );
        assert_eq!(second.attempt, SosAttemptId(2));
        sos.mark_scheduled(second.attempt, 3);

        // The first attempt's timer must not clear the second banner.
        assert!(!sos.display_window_elapsed(SosAttemptId(1)));
        assert_eq!(sos.attempt().status, SosStatus::Succeeded);

        assert!(sos.display_window_elapsed(SosAttemptId(2)));
        assert_eq!(sos.attempt().status, SosStatus::Idle);
    }

    #[test]
    fn test_partial_scheduling_is_not_success() {
        let geo = FakeGeoStream::unavailable();
        let mut sos = SosDispatcher::default();
        let plan = assert_matches!(
            sos.begin(&geo, &session(), request(three_contacts()), PositionOptions::one_shot()),
            Ok(SosStep::Ready(plan)) => plan
        );

        assert!(!sos.mark_scheduled(plan.attempt, 2));
        assert_matches!(sos.attempt().status, SosStatus::Failed(_));
    }

    #[test]
    fn test_bad_messaging_base_fails_attempt() {
        let geo = FakeGeoStream::unavailable();
        let config = CoreConfig {
            messaging_base_url: "::not-a-url".into(),
            ..CoreConfig::default()
        };
        let mut sos = SosDispatcher::new(&config);

        let result = sos.begin(&geo, &session(), request(three_contacts()), PositionOptions::one_shot());

        assert_matches!(result, Err(SosError::DeepLink(_)));
        assert_matches!(sos.attempt().status, SosStatus::Failed(_));

        // Failed is re-armable.
        sos.configure(&CoreConfig::default());
        assert!(sos
            .begin(&geo, &session(), request(three_contacts()), PositionOptions::one_shot())
            .is_ok());
    }

    #[test]
    fn test_custom_stagger() {
        let geo = FakeGeoStream::unavailable();
        let config = CoreConfig {
            sos_stagger_ms: 1_000,
            ..CoreConfig::default()
        };
        let mut sos = SosDispatcher::new(&config);

        let plan = assert_matches!(
            sos.begin(&geo, &session(), request(three_contacts()), PositionOptions::one_shot()),
            Ok(SosStep::Ready(plan)) => plan
        );
        assert_eq!(
            plan.opens.iter().map(|o| o.delay_ms).collect::<Vec<_>>(),
            vec![0, 1_000, 2_000]
        );
    }
}
