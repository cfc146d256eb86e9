use crate::model::Coordinate;
use crate::EARTH_RADIUS_M;

/// Great-circle distance in meters on a spherical earth.
#[must_use]
pub fn haversine_distance(p1: Coordinate, p2: Coordinate) -> f64 {
    if p1 == p2 {
        return 0.0;
    }

    let lat1_rad = p1.lat().to_radians();
    let lat2_rad = p2.lat().to_radians();
    let delta_lat = (p2.lat() - p1.lat()).to_radians();
    let delta_lng = (p2.lng() - p1.lng()).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);

    let a = a.clamp(0.0, 1.0);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[must_use]
pub fn format_distance(meters: f64) -> String {
    if !meters.is_finite() || meters < 0.0 {
        return "Unknown".to_string();
    }

    if meters < 1000.0 {
        format!("{}m", meters.round())
    } else {
        // Halves round up, not to even.
        let tenths_km = (meters / 100.0).round() / 10.0;
        format!("{tenths_km:.1}km")
    }
}

/// Accuracy radius as reported by the live tracker panel.
#[must_use]
pub fn format_accuracy(meters: f64) -> String {
    if meters.is_finite() && meters >= 0.0 {
        format!("{}m", meters.round())
    } else {
        "0m".to_string()
    }
}
