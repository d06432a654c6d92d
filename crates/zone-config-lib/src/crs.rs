//! Coordinate reference systems and reprojection to geographic WGS84
//!
//! Boundary datasets are published in whatever reference their producer chose.
//! Everything downstream works in EPSG:4326 (`x = longitude`, `y = latitude`),
//! so each supported reference only needs an inverse projection.

use crate::{Result, ZoneError};
use geo::Coord;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt;

/// WGS84 / GRS80 semi-major axis in meters (identical for both ellipsoids)
const SEMI_MAJOR_AXIS: f64 = 6378137.0;

/// WGS84 first eccentricity
const WGS84_ECCENTRICITY: f64 = 0.08181919084262149;

/// GRS80 inverse flattening
const GRS80_INVERSE_FLATTENING: f64 = 298.257222101;

/// A supported source coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Crs {
    /// Geographic longitude/latitude (EPSG:4326, CRS84, NAD83 variants)
    #[default]
    Wgs84,
    /// Spherical Web Mercator (EPSG:3857)
    WebMercator,
    /// WGS84 / UTM (EPSG:326zz north, EPSG:327zz south)
    Utm { zone: u8, north: bool },
    /// Statistics Canada Lambert conformal conic (EPSG:3347)
    StatCanLambert,
}

impl Crs {
    /// Resolve an EPSG code
    pub fn from_epsg(code: u32) -> Result<Self> {
        match code {
            4326 | 4269 | 4617 => Ok(Crs::Wgs84),
            3857 | 3785 | 900913 => Ok(Crs::WebMercator),
            32601..=32660 => Ok(Crs::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Crs::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            3347 => Ok(Crs::StatCanLambert),
            other => Err(ZoneError::UnsupportedCrs(format!("EPSG:{other}"))),
        }
    }

    /// Parse a reference name as found in GeoJSON `crs` members or on the command line
    ///
    /// Accepts `EPSG:3857`, `urn:ogc:def:crs:EPSG::3857`, `3857` and the
    /// `urn:ogc:def:crs:OGC:1.3:CRS84` form.
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.to_ascii_uppercase().ends_with("CRS84") {
            return Ok(Crs::Wgs84);
        }

        let code = name.rsplit(':').next().unwrap_or(name).trim();
        code.parse::<u32>()
            .map_err(|_| ZoneError::UnsupportedCrs(name.to_string()))
            .and_then(Self::from_epsg)
    }

    /// Reproject a coordinate from this reference to EPSG:4326
    #[inline]
    pub fn to_wgs84(&self, coord: Coord<f64>) -> Coord<f64> {
        let (lat, lon) = match *self {
            Crs::Wgs84 => return coord,
            Crs::WebMercator => mercator_to_wgs84(coord.x, coord.y),
            Crs::Utm { zone, north } => utm_to_wgs84(coord.x, coord.y, zone, north),
            Crs::StatCanLambert => STATCAN_LAMBERT.inverse(coord.x, coord.y),
        };
        Coord { x: lon, y: lat }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Wgs84 => write!(f, "EPSG:4326"),
            Crs::WebMercator => write!(f, "EPSG:3857"),
            Crs::Utm { zone, north: true } => write!(f, "EPSG:{}", 32600 + *zone as u32),
            Crs::Utm { zone, north: false } => write!(f, "EPSG:{}", 32700 + *zone as u32),
            Crs::StatCanLambert => write!(f, "EPSG:3347"),
        }
    }
}

/// Convert Web Mercator (x, y) in meters to WGS84 (lat, lon)
///
/// EPSG:3857 projects onto a sphere with the WGS84 semi-major axis as radius.
#[inline]
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / SEMI_MAJOR_AXIS).to_degrees();
    let lat = (2.0 * (y / SEMI_MAJOR_AXIS).exp().atan() - FRAC_PI_2).to_degrees();
    (lat, lon)
}

/// Convert WGS84 / UTM easting and northing to WGS84 (lat, lon)
pub fn utm_to_wgs84(easting: f64, northing: f64, zone: u8, north: bool) -> (f64, f64) {
    let a = SEMI_MAJOR_AXIS;
    let e = WGS84_ECCENTRICITY;
    let k0 = 0.9996_f64;
    let long_origin = (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0;

    let x = easting - 500000.0;
    let y = if north { northing } else { northing - 10000000.0 };

    let m = y / k0;
    let mu = m / (a * (1.0 - e * e / 4.0 - 3.0 * e.powi(4) / 64.0 - 5.0 * e.powi(6) / 256.0));
    let e1 = (1.0 - (1.0 - e * e).sqrt()) / (1.0 + (1.0 - e * e).sqrt());
    let j1 = 3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0;
    let j2 = 21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0;
    let j3 = 151.0 * e1.powi(3) / 96.0;
    let j4 = 1097.0 * e1.powi(4) / 512.0;
    let fp = mu
        + j1 * (2.0 * mu).sin()
        + j2 * (4.0 * mu).sin()
        + j3 * (6.0 * mu).sin()
        + j4 * (8.0 * mu).sin();

    let e2 = e * e / (1.0 - e * e);
    let c1 = e2 * fp.cos().powi(2);
    let t1 = fp.tan().powi(2);
    let r1 = a * (1.0 - e * e) / (1.0 - (e * fp.sin()).powi(2)).powf(1.5);
    let n1 = a / (1.0 - (e * fp.sin()).powi(2)).sqrt();
    let d = x / (n1 * k0);

    let lat = fp
        - (n1 * fp.tan() / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * e2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * e2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lon = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * e2 + 24.0 * t1 * t1) * d.powi(5)
            / 120.0)
        / fp.cos();

    (lat.to_degrees(), long_origin + lon.to_degrees())
}

/// Lambert conformal conic with two standard parallels on an ellipsoid
#[derive(Debug, Clone, Copy)]
struct LambertConic {
    inverse_flattening: f64,
    origin_lat: f64,
    origin_lon: f64,
    parallel_1: f64,
    parallel_2: f64,
    false_easting: f64,
    false_northing: f64,
}

/// NAD83 / Statistics Canada Lambert, the native reference of the FSA boundary files
const STATCAN_LAMBERT: LambertConic = LambertConic {
    inverse_flattening: GRS80_INVERSE_FLATTENING,
    origin_lat: 63.390675,
    origin_lon: -91.86666666666666,
    parallel_1: 49.0,
    parallel_2: 77.0,
    false_easting: 6200000.0,
    false_northing: 3000000.0,
};

impl LambertConic {
    fn eccentricity(&self) -> f64 {
        let f = 1.0 / self.inverse_flattening;
        (2.0 * f - f * f).sqrt()
    }

    fn m(&self, phi: f64) -> f64 {
        let e = self.eccentricity();
        phi.cos() / (1.0 - (e * phi.sin()).powi(2)).sqrt()
    }

    fn t(&self, phi: f64) -> f64 {
        let e = self.eccentricity();
        let es = e * phi.sin();
        (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
    }

    /// Returns (n, F, rho0)
    fn cone(&self) -> (f64, f64, f64) {
        let phi1 = self.parallel_1.to_radians();
        let phi2 = self.parallel_2.to_radians();
        let m1 = self.m(phi1);
        let m2 = self.m(phi2);
        let t1 = self.t(phi1);
        let t2 = self.t(phi2);

        let n = (m1.ln() - m2.ln()) / (t1.ln() - t2.ln());
        let big_f = m1 / (n * t1.powf(n));
        let rho0 = SEMI_MAJOR_AXIS * big_f * self.t(self.origin_lat.to_radians()).powf(n);
        (n, big_f, rho0)
    }

    #[cfg(test)]
    fn forward(&self, lat: f64, lon: f64) -> (f64, f64) {
        let (n, big_f, rho0) = self.cone();
        let rho = SEMI_MAJOR_AXIS * big_f * self.t(lat.to_radians()).powf(n);
        let theta = n * (lon - self.origin_lon).to_radians();
        (
            self.false_easting + rho * theta.sin(),
            self.false_northing + rho0 - rho * theta.cos(),
        )
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let (n, big_f, rho0) = self.cone();
        let e = self.eccentricity();

        let dx = x - self.false_easting;
        let dy = rho0 - (y - self.false_northing);
        let sign = n.signum();
        let rho = sign * (dx * dx + dy * dy).sqrt();
        let theta = (sign * dx).atan2(sign * dy);
        let t = (rho / (SEMI_MAJOR_AXIS * big_f)).powf(1.0 / n);

        // Latitude has no closed form; a handful of iterations converges to
        // well below a millimetre.
        let mut phi = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..15 {
            let es = e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
            let converged = (next - phi).abs() < 1e-12;
            phi = next;
            if converged {
                break;
            }
        }

        let lon = theta / n + self.origin_lon.to_radians();
        (phi.to_degrees(), lon.to_degrees())
    }
}
