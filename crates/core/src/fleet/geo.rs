//! Great-circle distance between two coordinates.

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_same_point() {
        assert!(haversine_km(37.975, 23.735, 37.975, 23.735) < 1e-9);
    }

    #[test]
    fn athens_to_thessaloniki_is_about_300_km() {
        let d = haversine_km(37.9838, 23.7275, 40.6401, 22.9444);
        assert!((d - 300.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn small_offset_is_under_one_km() {
        // ~0.005 deg latitude is roughly 550 m
        let d = haversine_km(37.975, 23.735, 37.980, 23.735);
        assert!(d < 1.0, "got {}", d);
    }
}
