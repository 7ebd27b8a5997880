//! Great-circle distance and polygon membership.

use crate::types::Coordinate;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates, in meters.
pub fn haversine(a: Coordinate, b: Coordinate) -> f64 {
    let lat_distance = (b.latitude - a.latitude).to_radians();
    let lon_distance = (b.longitude - a.longitude).to_radians();
    let h = (lat_distance / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (lon_distance / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Move `from` towards `to` by `fraction` of the way, linearly in degrees.
pub fn interpolate(from: Coordinate, to: Coordinate, fraction: f64) -> Coordinate {
    Coordinate {
        latitude:  from.latitude + (to.latitude - from.latitude) * fraction,
        longitude: from.longitude + (to.longitude - from.longitude) * fraction,
    }
}

/// Even-odd ray casting. The ring may or may not repeat its first vertex.
pub fn polygon_contains(ring: &[Coordinate], point: Coordinate) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let (x, y) = (point.latitude, point.longitude);
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].latitude, ring[i].longitude);
        let (xj, yj) = (ring[j].latitude, ring[j].longitude);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Meters expressed as degrees of latitude.
pub fn meters_to_latitude(meters: f64) -> f64 {
    (meters / EARTH_RADIUS_M).to_degrees()
}

/// Meters expressed as degrees of longitude at a given latitude.
pub fn meters_to_longitude(meters: f64, at_latitude: f64) -> f64 {
    meters_to_latitude(meters) / at_latitude.to_radians().cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_to_self() {
        let p = Coordinate::new(50.06, 19.94);
        assert_eq!(haversine(p, p), 0.0);
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = haversine(Coordinate::new(50.0, 19.0), Coordinate::new(51.0, 19.0));
        assert!((d - 111_194.93).abs() < 1.0, "got {d}");
    }

    #[test]
    fn latitude_conversion_round_trips() {
        let origin = Coordinate::new(50.0, 19.0);
        let north = Coordinate::new(50.0 + meters_to_latitude(250.0), 19.0);
        assert!((haversine(origin, north) - 250.0).abs() < 1e-6);
        let east = Coordinate::new(50.0, 19.0 + meters_to_longitude(250.0, 50.0));
        assert!((haversine(origin, east) - 250.0).abs() < 0.01);
    }

    #[test]
    fn square_membership() {
        let ring = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 1.0),
            Coordinate::new(1.0, 1.0),
            Coordinate::new(1.0, 0.0),
        ];
        assert!(polygon_contains(&ring, Coordinate::new(0.5, 0.5)));
        assert!(!polygon_contains(&ring, Coordinate::new(1.5, 0.5)));
        assert!(!polygon_contains(&ring[..2], Coordinate::new(0.5, 0.5)));
    }

    #[test]
    fn interpolation_midpoint() {
        let mid = interpolate(Coordinate::new(0.0, 0.0), Coordinate::new(2.0, 4.0), 0.5);
        assert_eq!(mid, Coordinate::new(1.0, 2.0));
    }
}
