mod external;
mod geolocation;
mod timer;

// Crux's built-in Render capability covers view updates as-is.
pub use crux_core::render::Render;

pub use self::external::{External, ExternalOperation};
pub use self::geolocation::{
    GeoError, GeoResult, GeoStream, Geolocation, GeolocationOperation, PositionOptions,
    RawPosition, WatchId,
};
pub use self::timer::{Timer, TimerOperation, TimerOutput};

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub geolocation: Geolocation<Event>,
    pub external: External<Event>,
    pub timer: Timer<Event>,
}
