use serde::{Deserialize, Serialize};

/// A geographic point in decimal degrees. Immutable value type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to `other`, in meters.
    pub fn haversine_m(&self, other: &Coordinate) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();
        EARTH_RADIUS_M * c
    }

    /// `true` if both coordinates are within 1e-4 degrees on each axis —
    /// the degenerate-mission threshold used by the drone engine.
    pub fn nearly_equal(&self, other: &Coordinate) -> bool {
        (self.lat - other.lat).abs() < 1e-4 && (self.lon - other.lon).abs() < 1e-4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_distance() {
        let a = Coordinate::new(45.0, 9.0);
        assert!(a.haversine_m(&a) < 1e-6);
    }

    #[test]
    fn haversine_known_distance() {
        // Roughly 111 km per degree of latitude at the equator.
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(1.0, 0.0);
        let d = a.haversine_m(&b);
        assert!((d - 111_195.0).abs() < 500.0);
    }

    #[test]
    fn nearly_equal_respects_threshold() {
        let a = Coordinate::new(45.0, 9.0);
        let b = Coordinate::new(45.00005, 9.00005);
        let c = Coordinate::new(45.01, 9.0);
        assert!(a.nearly_equal(&b));
        assert!(!a.nearly_equal(&c));
    }
}
