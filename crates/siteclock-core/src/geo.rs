//! Great-circle distance math.
//!
//! Geofence radii in this system are in the 50-500 m range, so the plain
//! haversine formula on a spherical Earth is accurate to well within a
//! meter at the distances that matter.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Haversine great-circle distance between two coordinates, in meters.
///
/// Pure and deterministic. `distance_m(a, a)` is 0 and the function is
/// symmetric in its arguments.
pub fn distance_m(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let p = Coordinate::new(48.8584, 2.2945);
        assert_eq!(distance_m(p, p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Coordinate::new(51.5007, -0.1246);
        let b = Coordinate::new(51.5055, -0.0754);
        assert!((distance_m(a, b) - distance_m(b, a)).abs() < 1e-9);
    }

    #[test]
    fn hundred_meters_north_within_one_percent() {
        // One degree of latitude is ~111,195 m on the sphere used here,
        // so 100 m north is ~0.000899 degrees.
        let a = Coordinate::new(40.0, -74.0);
        let b = Coordinate::new(40.0 + 100.0 / 111_195.0, -74.0);
        let d = distance_m(a, b);
        assert!((d - 100.0).abs() < 1.0, "got {d}");
    }

    #[test]
    fn known_city_pair_roughly_correct() {
        // Paris <-> London, ~344 km.
        let paris = Coordinate::new(48.8566, 2.3522);
        let london = Coordinate::new(51.5074, -0.1278);
        let d = distance_m(paris, london);
        assert!(d > 330_000.0 && d < 350_000.0, "got {d}");
    }
}
