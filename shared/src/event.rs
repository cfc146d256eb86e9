use serde::{Deserialize, Serialize};

use crate::capabilities::{GeoResult, WatchId};
use crate::config::CoreConfig;
use crate::model::{AuthSession, EmergencyContact, RouteSearch};
use crate::sos::SosAttemptId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // --- Shell lifecycle ---
    Configure(CoreConfig),
    PlatformReady {
        geolocation_supported: bool,
    },

    // --- Collaborator data ---
    SessionChanged(AuthSession),
    ContactsLoaded(Vec<EmergencyContact>),
    RoutesLoaded(RouteSearch),

    // --- User actions ---
    RouteSelected {
        index: usize,
    },
    RouteViewClosed,
    TrackingToggled,
    SosRequested,
    NoContactsPromptDismissed,
    ManageContactsRequested,
    NavigationHandled,

    // --- Capability callbacks, never sent by the shell ---
    #[serde(skip)]
    TrackingSample {
        watch_id: WatchId,
        seq: u64,
        result: GeoResult,
    },
    #[serde(skip)]
    SosLocationResolved {
        attempt: SosAttemptId,
        result: GeoResult,
    },
    #[serde(skip)]
    SosLocationDeadline {
        attempt: SosAttemptId,
    },
    #[serde(skip)]
    SosBannerElapsed {
        attempt: SosAttemptId,
    },
}

impl Event {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Configure(_) => "configure",
            Self::PlatformReady { .. } => "platform_ready",
            Self::SessionChanged(_) => "session_changed",
            Self::ContactsLoaded(_) => "contacts_loaded",
            Self::RoutesLoaded(_) => "routes_loaded",
            Self::RouteSelected { .. } => "route_selected",
            Self::RouteViewClosed => "route_view_closed",
            Self::TrackingToggled => "tracking_toggled",
            Self::SosRequested => "sos_requested",
            Self::NoContactsPromptDismissed => "no_contacts_prompt_dismissed",
            Self::ManageContactsRequested => "manage_contacts_requested",
            Self::NavigationHandled => "navigation_handled",
            Self::TrackingSample { .. } => "tracking_sample",
            Self::SosLocationResolved { .. } => "sos_location_resolved",
            Self::SosLocationDeadline { .. } => "sos_location_deadline",
            Self::SosBannerElapsed { .. } => "sos_banner_elapsed",
        }
    }

    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::RouteSelected { .. }
                | Self::RouteViewClosed
                | Self::TrackingToggled
                | Self::SosRequested
                | Self::NoContactsPromptDismissed
                | Self::ManageContactsRequested
        )
    }
}
