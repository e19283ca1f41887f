//! Universal Transverse Mercator projection.
//!
//! Forward and inverse series expansions on a reference ellipsoid, plus the
//! zone-number and latitude-band rules (including the Norway and Svalbard
//! exceptions).

use serde::{Deserialize, Serialize};

/// Scale factor on the central meridian.
const K0: f64 = 0.9996;
/// False easting applied to every zone.
const FALSE_EASTING: f64 = 500_000.0;
/// False northing applied south of the equator.
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Semi-major axis and first eccentricity squared of a reference ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    pub semi_major_axis: f64,
    pub ecc_squared: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        semi_major_axis: 6_378_137.0,
        ecc_squared: 0.006_694_38,
    };
    pub const GRS80: Ellipsoid = Ellipsoid {
        semi_major_axis: 6_378_137.0,
        ecc_squared: 0.006_694_38,
    };
    pub const AIRY: Ellipsoid = Ellipsoid {
        semi_major_axis: 6_377_563.0,
        ecc_squared: 0.006_670_54,
    };
    pub const CLARKE_1866: Ellipsoid = Ellipsoid {
        semi_major_axis: 6_378_206.0,
        ecc_squared: 0.006_768_658,
    };
    pub const INTERNATIONAL: Ellipsoid = Ellipsoid {
        semi_major_axis: 6_378_388.0,
        ecc_squared: 0.006_722_67,
    };

    /// Look an ellipsoid up by its conventional datum name.
    pub fn by_name(name: &str) -> Option<Ellipsoid> {
        match name {
            "WGS 84" => Some(Self::WGS84),
            "GRS 1980" => Some(Self::GRS80),
            "Airy" => Some(Self::AIRY),
            "Clarke 1866" => Some(Self::CLARKE_1866),
            "International" => Some(Self::INTERNATIONAL),
            _ => None,
        }
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::WGS84
    }
}

/// A projected UTM coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtmCoordinate {
    pub easting: f64,
    pub northing: f64,
    pub zone_number: u8,
    pub zone_letter: char,
}

impl UtmCoordinate {
    /// Northern-hemisphere bands are `N` through `X`.
    pub fn is_northern(&self) -> bool {
        self.zone_letter >= 'N'
    }
}

/// UTM zone for a position, honouring the Norway and Svalbard exceptions.
pub fn zone_number(latitude: f64, longitude: f64) -> u8 {
    if (8.0..=13.0).contains(&longitude) && latitude > 54.5 && latitude < 58.0 {
        return 32;
    }
    if (56.0..64.0).contains(&latitude) && (3.0..12.0).contains(&longitude) {
        return 32;
    }
    if (72.0..84.0).contains(&latitude) {
        if (0.0..9.0).contains(&longitude) {
            return 31;
        } else if (9.0..21.0).contains(&longitude) {
            return 33;
        } else if (21.0..33.0).contains(&longitude) {
            return 35;
        } else if (33.0..42.0).contains(&longitude) {
            return 37;
        }
    }
    ((longitude + 180.0) / 6.0 + 1.0).floor() as u8
}

/// Latitude band letter, `Z` outside the UTM latitude range.
pub fn zone_letter(latitude: f64) -> char {
    const BANDS: &[u8] = b"CDEFGHJKLMNPQRSTUVWX";
    if !(-80.0..=84.0).contains(&latitude) {
        return 'Z';
    }
    if latitude >= 72.0 {
        return 'X';
    }
    let index = ((latitude + 80.0) / 8.0).floor() as usize;
    BANDS[index.min(BANDS.len() - 1)] as char
}

fn central_meridian(zone_number: u8) -> f64 {
    (f64::from(zone_number) - 1.0) * 6.0 - 180.0 + 3.0
}

/// Project a geodetic position onto UTM in its own zone.
pub fn lat_lng_to_utm(latitude: f64, longitude: f64, ellipsoid: Ellipsoid) -> UtmCoordinate {
    lat_lng_to_utm_in_zone(latitude, longitude, zone_number(latitude, longitude), ellipsoid)
}

/// Project a geodetic position onto a fixed UTM zone.
///
/// Keeps positions that straddle a zone boundary continuous with a
/// reference projected in `zone`.
pub fn lat_lng_to_utm_in_zone(
    latitude: f64,
    longitude: f64,
    zone: u8,
    ellipsoid: Ellipsoid,
) -> UtmCoordinate {
    let a = ellipsoid.semi_major_axis;
    let e2 = ellipsoid.ecc_squared;
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    let lat_rad = latitude.to_radians();
    let lon_rad = longitude.to_radians();
    let origin_rad = central_meridian(zone).to_radians();

    let ecc_prime_squared = e2 / (1.0 - e2);
    let (sin_lat, cos_lat) = lat_rad.sin_cos();
    let tan_lat = lat_rad.tan();

    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = ecc_prime_squared * cos_lat * cos_lat;
    let big_a = cos_lat * (lon_rad - origin_rad);

    let m = a
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat_rad
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat_rad).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat_rad).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * lat_rad).sin());

    let easting = K0
        * n
        * (big_a
            + (1.0 - t + c) * big_a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ecc_prime_squared) * big_a.powi(5)
                / 120.0)
        + FALSE_EASTING;

    let mut northing = K0
        * (m + n
            * tan_lat
            * (big_a * big_a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * big_a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ecc_prime_squared)
                    * big_a.powi(6)
                    / 720.0));
    if latitude < 0.0 {
        northing += FALSE_NORTHING_SOUTH;
    }

    UtmCoordinate {
        easting,
        northing,
        zone_number: zone,
        zone_letter: zone_letter(latitude),
    }
}

/// Inverse projection. Returns `(latitude, longitude)` in degrees.
pub fn utm_to_lat_lng(utm: &UtmCoordinate, ellipsoid: Ellipsoid) -> (f64, f64) {
    let a = ellipsoid.semi_major_axis;
    let e2 = ellipsoid.ecc_squared;
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
    let x = utm.easting - FALSE_EASTING;
    let mut y = utm.northing;
    if !utm.is_northern() {
        y -= FALSE_NORTHING_SOUTH;
    }

    let origin = central_meridian(utm.zone_number);
    let ecc_prime_squared = e2 / (1.0 - e2);

    let m = y / K0;
    let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin();

    let (sin_phi, cos_phi) = phi1.sin_cos();
    let tan_phi = phi1.tan();
    let n1 = a / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t1 = tan_phi * tan_phi;
    let c1 = ecc_prime_squared * cos_phi * cos_phi;
    let r1 = a * (1.0 - e2) / (1.0 - e2 * sin_phi * sin_phi).powf(1.5);
    let d = x / (n1 * K0);

    let lat = phi1
        - (n1 * tan_phi / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ecc_prime_squared)
                    * d.powi(4)
                    / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * ecc_prime_squared
                    - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);

    let lon = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ecc_prime_squared + 24.0 * t1 * t1)
            * d.powi(5)
            / 120.0)
        / cos_phi;

    (lat.to_degrees(), origin + lon.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_numbers() {
        assert_eq!(zone_number(37.7749, -122.4194), 10);
        assert_eq!(zone_number(51.5074, -0.1278), 30);
        // Bergen, Norway exception.
        assert_eq!(zone_number(60.39, 5.32), 32);
        // Svalbard.
        assert_eq!(zone_number(78.22, 15.65), 33);
        assert_eq!(zone_number(-33.86, 151.21), 56);
    }

    #[test]
    fn zone_letters() {
        assert_eq!(zone_letter(37.7749), 'S');
        assert_eq!(zone_letter(0.0), 'N');
        assert_eq!(zone_letter(-0.5), 'M');
        assert_eq!(zone_letter(-33.86), 'H');
        assert_eq!(zone_letter(84.0), 'X');
        assert_eq!(zone_letter(85.0), 'Z');
        assert_eq!(zone_letter(-80.0), 'C');
    }

    #[test]
    fn central_meridian_sits_on_false_easting() {
        let utm = lat_lng_to_utm(45.0, -123.0, Ellipsoid::WGS84);
        assert_eq!(utm.zone_number, 10);
        assert!((utm.easting - FALSE_EASTING).abs() < 1e-6);
    }

    #[test]
    fn southern_hemisphere_gets_false_northing() {
        let utm = lat_lng_to_utm(-33.86, 151.21, Ellipsoid::WGS84);
        assert!(utm.northing > 6_000_000.0 && utm.northing < FALSE_NORTHING_SOUTH);
        assert!(!utm.is_northern());
    }

    #[test]
    fn forward_inverse_round_trip() {
        let samples = [
            (37.7749, -122.4194),
            (51.5074, -0.1278),
            (-33.86, 151.21),
            (35.6762, 139.6503),
            (60.39, 5.32),
        ];
        for (lat, lon) in samples {
            let utm = lat_lng_to_utm(lat, lon, Ellipsoid::WGS84);
            let (lat2, lon2) = utm_to_lat_lng(&utm, Ellipsoid::WGS84);
            assert!((lat - lat2).abs() < 1e-5, "lat {lat} -> {lat2}");
            assert!((lon - lon2).abs() < 1e-5, "lon {lon} -> {lon2}");
        }
    }

    #[test]
    fn ellipsoid_lookup() {
        assert_eq!(Ellipsoid::by_name("WGS 84"), Some(Ellipsoid::WGS84));
        assert!(Ellipsoid::by_name("Martian").is_none());
    }
}
