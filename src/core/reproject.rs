//! Pure-Rust reprojection of projected coordinates back to WGS84.
//!
//! Covers Web Mercator (EPSG:3857) and UTM (EPSG:326xx / 327xx) using the
//! inverse formulas from Snyder 1987 (USGS Prof. Paper 1395).

use crate::domain::model::{Crs, GeoPoint};
use crate::domain::ports::CoordinateTransform;

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Transform backed by the closed-form projections in this module.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinTransform {
    source: Crs,
}

impl BuiltinTransform {
    pub fn new(source: Crs) -> Self {
        Self { source }
    }
}

impl CoordinateTransform for BuiltinTransform {
    fn to_wgs84(&self, x: f64, y: f64) -> GeoPoint {
        match self.source {
            Crs::Wgs84 => GeoPoint::new(x, y),
            Crs::WebMercator => web_mercator_to_wgs84(x, y),
            Crs::Utm { zone, north } => utm_to_wgs84(x, y, zone, north),
        }
    }
}

pub fn web_mercator_to_wgs84(x: f64, y: f64) -> GeoPoint {
    let lon = (x / A).to_degrees();
    let lat = (2.0 * (y / A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    GeoPoint::new(lon, lat)
}

pub fn wgs84_to_web_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = A * lon.to_radians();
    let y = A * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

/// Snyder eq. 8-18 .. 8-25.
pub fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> GeoPoint {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sqrt_one_minus_e2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_one_minus_e2) / (1.0 + sqrt_one_minus_e2);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    // Footpoint latitude
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = E_PRIME2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let denom = 1.0 - E2 * sin_phi1 * sin_phi1;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - E2) / denom.powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * E_PRIME2
                    - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1)
                * d5
                / 120.0)
            / cos_phi1;

    GeoPoint::new(lon.to_degrees(), lat.to_degrees())
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
        let diff = (a - b).abs();
        assert!(
            diff < tol,
            "{msg}: expected {b}, got {a}, diff {diff} exceeds tolerance {tol}"
        );
    }

    // pyproj: Transformer.from_crs(4326, 32630, always_xy=True)
    //   .transform(-3.7037, 40.4168) -> (440298.94, 4474257.31)
    #[test]
    fn madrid_utm30n_to_wgs84() {
        let p = utm_to_wgs84(440_298.94, 4_474_257.31, 30, true);
        assert_close(p.lon, -3.7037, 1e-4, "lon");
        assert_close(p.lat, 40.4168, 1e-4, "lat");
    }

    // Buenos Aires, UTM 21S: (373317.50, 6170036.17)
    #[test]
    fn buenos_aires_utm21s_to_wgs84() {
        let p = utm_to_wgs84(373_317.50, 6_170_036.17, 21, false);
        assert_close(p.lon, -58.3816, 1e-4, "lon");
        assert_close(p.lat, -34.6037, 1e-4, "lat");
    }

    #[test]
    fn central_meridian_at_equator() {
        let p = utm_to_wgs84(500_000.0, 0.0, 30, true);
        assert_close(p.lon, -3.0, 1e-9, "lon at CM");
        assert_close(p.lat, 0.0, 1e-9, "lat at equator");
    }

    #[test]
    fn web_mercator_round_trip() {
        let (x, y) = wgs84_to_web_mercator(13.4050, 52.5200);
        let p = web_mercator_to_wgs84(x, y);
        assert_close(p.lon, 13.4050, 1e-9, "lon");
        assert_close(p.lat, 52.5200, 1e-9, "lat");
    }

    #[test]
    fn web_mercator_antimeridian() {
        let p = web_mercator_to_wgs84(20_037_508.342_789_244, 0.0);
        assert_close(p.lon, 180.0, 1e-9, "lon");
        assert_close(p.lat, 0.0, 1e-9, "lat");
    }

    #[test]
    fn builtin_transform_wgs84_is_identity() {
        let t = BuiltinTransform::new(Crs::Wgs84);
        assert_eq!(t.to_wgs84(12.5, -7.25), GeoPoint::new(12.5, -7.25));
    }
}
