use tracing::{debug, info, instrument, warn};

use crate::capabilities::{
    Capabilities, GeoError, GeoResult, GeoStream, Geolocation, PositionOptions, WatchId,
};
use crate::event::Event;
use crate::geo::format_accuracy;
use crate::model::{
    Coordinate, FactorView, Model, Navigation, PlatformSupport, PositionSample, PositionView,
    Route, RouteCardView, RouteDetailView, SosPhase, SosView, TrackingView, ViewModel,
};
use crate::safety::{clamp_score, factor_color};
use crate::sos::{DispatchPlan, SosAttemptId, SosError, SosRequest, SosStatus, SosStep};
use crate::{ErrorKind, MAX_EMERGENCY_CONTACTS};

pub const SOS_SENT_MESSAGE: &str = "SOS sent via WhatsApp!";

/// `GeoStream` backed by the shell's geolocation capability. Results come
/// back as `Event::TrackingSample` and `Event::SosLocationResolved`.
pub struct ShellGeoStream<'a> {
    geolocation: &'a Geolocation<Event>,
    supported: bool,
}

impl<'a> ShellGeoStream<'a> {
    pub fn new(geolocation: &'a Geolocation<Event>, platform: PlatformSupport) -> Self {
        Self {
            geolocation,
            supported: platform.geolocation,
        }
    }
}

impl GeoStream for ShellGeoStream<'_> {
    fn start(&self, watch_id: WatchId, options: PositionOptions) -> Result<(), GeoError> {
        if !self.supported {
            return Err(GeoError::Unavailable);
        }
        self.geolocation
            .watch(watch_id, options, |watch_id, seq, result| Event::TrackingSample {
                watch_id,
                seq,
                result,
            });
        Ok(())
    }

    fn stop(&self, watch_id: WatchId) {
        self.geolocation.clear_watch(watch_id);
    }

    fn get_once(&self, ticket: u64, options: PositionOptions) -> Result<(), GeoError> {
        if !self.supported {
            return Err(GeoError::Unavailable);
        }
        let attempt = SosAttemptId(ticket);
        self.geolocation
            .get_current(options, move |result| Event::SosLocationResolved { attempt, result });
        Ok(())
    }
}

#[derive(Default)]
pub struct App;

impl App {
    #[instrument(skip_all, fields(contacts = model.contacts.len()))]
    fn request_sos(model: &mut Model, caps: &Capabilities) {
        let (origin_label, dest_label) = model.route_labels();
        let request = SosRequest {
            origin_label,
            dest_label,
            contacts: model.contacts.clone(),
        };
        let options = model.config.sos_location;
        let geo = ShellGeoStream::new(&caps.geolocation, model.platform);

        match model.sos.begin(&geo, &model.session, request, options) {
            Ok(SosStep::AwaitingLocation(attempt)) => {
                model.sos_banner = None;
                caps.timer.notify_after(options.timeout_ms, move || {
                    Event::SosLocationDeadline { attempt }
                });
            }
            Ok(SosStep::Ready(plan)) => {
                model.sos_banner = None;
                Self::execute_plan(model, caps, plan);
            }
            Err(SosError::AlreadySending) => {
                debug!("SOS request ignored while sending");
            }
            Err(SosError::NoContactsConfigured) => {
                model.show_no_contacts_prompt = true;
            }
            Err(e) => {
                warn!(error = %e, kind = %e.kind(), "SOS blocked");
                model.sos_banner = Some(e.kind().user_facing_message().to_owned());
            }
        }
    }

    fn continue_sos(model: &mut Model, caps: &Capabilities, outcome: Result<DispatchPlan, SosError>) {
        match outcome {
            Ok(plan) => Self::execute_plan(model, caps, plan),
            Err(SosError::Stale(attempt)) => {
                debug!(%attempt, "ignoring late SOS callback");
            }
            Err(e) => {
                model.sos_banner = Some(e.kind().user_facing_message().to_owned());
            }
        }
    }

    /// Hand every staggered open to the shell, then start the success
    /// display window.
    fn execute_plan(model: &mut Model, caps: &Capabilities, plan: DispatchPlan) {
        let attempt = plan.attempt;
        let mut scheduled = 0;
        for open in plan.opens {
            debug!(%attempt, contact = %open.contact_id, delay_ms = open.delay_ms, "scheduling open");
            caps.external.open_after(open.url, open.delay_ms);
            scheduled += 1;
        }

        if model.sos.mark_scheduled(attempt, scheduled) {
            caps.timer
                .notify_after(model.config.sos_success_display_ms, move || {
                    Event::SosBannerElapsed { attempt }
                });
        } else {
            model.sos_banner = Some(ErrorKind::Internal.user_facing_message().to_owned());
        }
    }

    fn sos_location(attempt: SosAttemptId, result: GeoResult) -> Option<Coordinate> {
        match result.map(|raw| Coordinate::new(raw.lat, raw.lng)) {
            Ok(Ok(location)) => Some(location),
            Ok(Err(e)) => {
                warn!(%attempt, error = %e, "discarding invalid SOS fix");
                None
            }
            Err(e) => {
                info!(%attempt, error = %e, "no SOS fix, sending without location");
                None
            }
        }
    }

    fn route_card(index: usize, route: &Route) -> RouteCardView {
        let class = route.safety();
        RouteCardView {
            index,
            name: route.name.clone(),
            safety_score: class.score,
            tier: class.tier,
            tier_label: class.tier.label().to_owned(),
            color_token: class.color_token,
            distance: route.distance.clone(),
            duration: route.duration.clone(),
        }
    }

    fn route_detail(model: &Model, index: usize, route: &Route) -> RouteDetailView {
        let (origin_label, dest_label) = model.route_labels();
        RouteDetailView {
            card: Self::route_card(index, route),
            origin_label,
            dest_label,
            factors: route
                .safety_factors
                .iter()
                .map(|factor| FactorView {
                    name: factor.name.clone(),
                    score: clamp_score(factor.score),
                    color_token: factor_color(factor.score),
                })
                .collect(),
            geometry: route.geometry(),
        }
    }

    fn tracking_view(model: &Model) -> TrackingView {
        let session = model.tracking.session();
        let active = model.tracking.is_active();

        let position = session.last_sample.map(|sample| {
            let (lat, lng) = (sample.coordinate.lat(), sample.coordinate.lng());
            PositionView {
                lat,
                lng,
                lat_text: format!("{lat:.5}"),
                lng_text: format!("{lng:.5}"),
                accuracy_text: format_accuracy(sample.accuracy_m),
            }
        });

        TrackingView {
            active,
            acquiring: active && position.is_none(),
            error: session.error().map(str::to_owned),
            position,
            distance_to_destination: session.distance_to_destination.clone(),
            distance_label: session
                .distance_to_destination
                .as_ref()
                .map(|distance| format!("~{distance}")),
        }
    }

    fn sos_view(model: &Model) -> SosView {
        let status = &model.sos.attempt().status;
        let phase = match status {
            SosStatus::Idle => SosPhase::Idle,
            SosStatus::ResolvingLocation | SosStatus::Dispatching => SosPhase::Sending,
            SosStatus::Succeeded => SosPhase::Sent,
            SosStatus::Failed(_) => SosPhase::Failed,
        };
        let banner = if phase == SosPhase::Sent {
            Some(SOS_SENT_MESSAGE.to_owned())
        } else {
            model.sos_banner.clone()
        };

        SosView {
            phase,
            button_enabled: !status.is_busy(),
            banner,
            show_no_contacts_prompt: model.show_no_contacts_prompt,
            contact_count: model.contacts.len(),
        }
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        let event_name = event.name();
        if event.is_user_initiated() {
            info!(event = event_name, "user action");
        } else {
            debug!(event = event_name, "event");
        }

        match event {
            Event::Configure(config) => match config.validate() {
                Ok(()) => {
                    model.tracking.set_options(config.tracking);
                    model.sos.configure(&config);
                    model.config = config;
                    info!("configuration applied");
                }
                Err(e) => warn!(error = %e, "configuration rejected, keeping previous"),
            },

            Event::PlatformReady {
                geolocation_supported,
            } => {
                model.platform = PlatformSupport {
                    geolocation: geolocation_supported,
                };
            }

            Event::SessionChanged(session) => {
                if !session.is_authenticated() {
                    model.contacts.clear();
                    model.show_no_contacts_prompt = false;
                }
                model.session = session;
            }

            Event::ContactsLoaded(contacts) => {
                if contacts.len() > MAX_EMERGENCY_CONTACTS {
                    warn!(count = contacts.len(), "more contacts than the account limit");
                }
                if !contacts.is_empty() {
                    model.show_no_contacts_prompt = false;
                }
                model.contacts = contacts;
            }

            Event::RoutesLoaded(search) => {
                let geo = ShellGeoStream::new(&caps.geolocation, model.platform);
                model.tracking.attach_route(&geo, None);
                model.selected_route = None;
                info!(routes = search.routes.len(), "routes loaded");
                model.search = Some(search);
            }

            Event::RouteSelected { index } => {
                if model.selected_route == Some(index) {
                    debug!(index, "route already selected");
                } else {
                    let geo = ShellGeoStream::new(&caps.geolocation, model.platform);
                    let route = model
                        .search
                        .as_ref()
                        .and_then(|search| search.routes.get(index));
                    if route.is_some() {
                        model.tracking.attach_route(&geo, route);
                        model.selected_route = Some(index);
                    } else {
                        warn!(index, "selected route does not exist");
                    }
                }
            }

            Event::RouteViewClosed => {
                let geo = ShellGeoStream::new(&caps.geolocation, model.platform);
                model.tracking.attach_route(&geo, None);
                model.selected_route = None;
            }

            Event::TrackingToggled => {
                let geo = ShellGeoStream::new(&caps.geolocation, model.platform);
                model.tracking.toggle(&geo);
            }

            Event::TrackingSample {
                watch_id,
                seq,
                result,
            } => match result {
                Ok(raw) => match PositionSample::try_from(raw) {
                    Ok(sample) => {
                        model.tracking.on_sample(watch_id, seq, sample);
                    }
                    Err(e) => warn!(%watch_id, seq, error = %e, "discarding invalid position"),
                },
                Err(e) => {
                    let geo = ShellGeoStream::new(&caps.geolocation, model.platform);
                    model.tracking.on_error(&geo, watch_id, &e);
                }
            },

            Event::SosRequested => Self::request_sos(model, caps),

            Event::SosLocationResolved { attempt, result } => {
                let location = Self::sos_location(attempt, result);
                let outcome = model.sos.resolve_location(attempt, location);
                Self::continue_sos(model, caps, outcome);
            }

            Event::SosLocationDeadline { attempt } => {
                let outcome = model.sos.expire_location(attempt);
                if outcome.is_ok() {
                    info!(%attempt, "SOS location deadline passed");
                }
                Self::continue_sos(model, caps, outcome);
            }

            Event::SosBannerElapsed { attempt } => {
                if model.sos.display_window_elapsed(attempt) {
                    debug!(%attempt, "SOS success banner cleared");
                }
            }

            Event::NoContactsPromptDismissed => {
                model.show_no_contacts_prompt = false;
            }

            Event::ManageContactsRequested => {
                model.show_no_contacts_prompt = false;
                model.pending_navigation = Some(Navigation::ContactManagement);
            }

            Event::NavigationHandled => {
                model.pending_navigation = None;
            }
        }

        caps.render.render();
    }

    fn view(&self, model: &Model) -> ViewModel {
        let routes = model
            .search
            .as_ref()
            .map(|search| {
                search
                    .routes
                    .iter()
                    .enumerate()
                    .map(|(index, route)| Self::route_card(index, route))
                    .collect()
            })
            .unwrap_or_default();

        let active_route = model
            .selected_route
            .zip(model.active_route())
            .map(|(index, route)| Self::route_detail(model, index, route));

        ViewModel {
            routes,
            active_route,
            tracking: Self::tracking_view(model),
            sos: Self::sos_view(model),
            navigation: model.pending_navigation,
        }
    }
}
