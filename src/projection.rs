//! UTM projection of geographic coordinates
//!
//! Converts WGS84 latitude/longitude into planar UTM easting/northing using
//! the Krüger series expansion, and back. The whole pipeline works in a
//! single UTM zone so that Euclidean distance in metres is meaningful;
//! [`project_batch`] enforces this by projecting every point into the zone
//! of the first one and rejecting batches whose eastings stray more than
//! 400 km from the central meridian.
//!
//! Eastings and northings are truncated toward zero to integer metres.

use thiserror::Error;

use crate::types::{GeoPoint, TypeError};

#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error(
        "Region too large, does not fit into a single UTM zone: \
         lat {lat_min:.2}..{lat_max:.2}, lon {lon_min:.2}..{lon_max:.2}"
    )]
    RegionTooLarge {
        lat_min: f64,
        lat_max: f64,
        lon_min: f64,
        lon_max: f64,
    },
    #[error("Trackpoints ({tracks}) and waypoints ({waypoints}) in different UTM zones")]
    ZoneMismatch { tracks: UtmZone, waypoints: UtmZone },
    #[error("Latitude {0} outside the UTM band range of -80..84 degrees")]
    LatitudeOutOfRange(f64),
    #[error("Cannot project an empty batch")]
    EmptyBatch,
    #[error("Core type error")]
    Type(#[from] TypeError),
}

type Result<T> = std::result::Result<T, ProjectionError>;

// WGS84 ellipsoid and Krüger series coefficients.
const K0: f64 = 0.9996;
const R: f64 = 6_378_137.0;
const E: f64 = 0.006_694_38;
const E2: f64 = E * E;
const E3: f64 = E2 * E;
const E_P2: f64 = E / (1.0 - E);

const M1: f64 = 1.0 - E / 4.0 - 3.0 * E2 / 64.0 - 5.0 * E3 / 256.0;
const M2: f64 = 3.0 * E / 8.0 + 3.0 * E2 / 32.0 + 45.0 * E3 / 1024.0;
const M3: f64 = 15.0 * E2 / 256.0 + 45.0 * E3 / 1024.0;
const M4: f64 = 35.0 * E3 / 3072.0;

const ZONE_LETTERS: &[u8] = b"CDEFGHJKLMNPQRSTUVWXX";

/// The zone tag shared by every coordinate of a projected batch.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct UtmZone {
    /// Zone number, 1..=60. Each zone is a 6-degree band of longitude.
    pub number: u8,

    /// Latitude band letter, C..=X.
    pub letter: char,
}

impl UtmZone {
    /// Whether the zone lies in the northern hemisphere.
    pub fn is_northern(&self) -> bool {
        self.letter >= 'N'
    }
}

impl std::fmt::Display for UtmZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.number, self.letter)
    }
}

/// A projected position in integer metres.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct UtmCoord {
    /// Easting in metres from the zone's false origin.
    pub east: i64,

    /// Northing in metres from the equator (southern-hemisphere points are
    /// offset by 10 000 km, as usual for UTM).
    pub north: i64,
}

fn zone_number(lat: f64, lon: f64) -> u8 {
    // Zone exceptions around southern Norway and Svalbard.
    if (56.0..64.0).contains(&lat) && (3.0..12.0).contains(&lon) {
        return 32;
    }
    if (72.0..=84.0).contains(&lat) && lon >= 0.0 {
        if lon < 9.0 {
            return 31;
        } else if lon < 21.0 {
            return 33;
        } else if lon < 33.0 {
            return 35;
        } else if lon < 42.0 {
            return 37;
        }
    }
    ((((lon + 180.0) / 6.0) as i32) % 60 + 1) as u8
}

fn zone_letter(lat: f64) -> Result<char> {
    if !(-80.0..=84.0).contains(&lat) {
        return Err(ProjectionError::LatitudeOutOfRange(lat));
    }
    let index = (((lat + 80.0) as i32) >> 3).clamp(0, 20) as usize;
    Ok(ZONE_LETTERS[index] as char)
}

fn central_longitude(zone_number: u8) -> f64 {
    (zone_number as f64 - 1.0) * 6.0 - 180.0 + 3.0
}

fn wrap_degrees(value: f64) -> f64 {
    if value >= 180.0 {
        value - 360.0
    } else if value < -180.0 {
        value + 360.0
    } else {
        value
    }
}

/// Project a point into the given zone, returning fractional metres.
///
/// The caller picks the zone; nothing here checks that the point actually
/// belongs to it. Batch-level region checks live in [`project_batch`].
fn forward(point: &GeoPoint, zone_number: u8) -> (f64, f64) {
    let lat_rad = point.lat().to_radians();
    let lat_sin = lat_rad.sin();
    let lat_cos = lat_rad.cos();

    let lat_tan = lat_sin / lat_cos;
    let lat_tan2 = lat_tan * lat_tan;
    let lat_tan4 = lat_tan2 * lat_tan2;

    let n = R / (1.0 - E * lat_sin * lat_sin).sqrt();
    let c = E_P2 * lat_cos * lat_cos;

    let a = lat_cos * wrap_degrees(point.lon() - central_longitude(zone_number)).to_radians();
    let a2 = a * a;
    let a3 = a2 * a;
    let a4 = a3 * a;
    let a5 = a4 * a;
    let a6 = a5 * a;

    let m = R
        * (M1 * lat_rad - M2 * (2.0 * lat_rad).sin() + M3 * (4.0 * lat_rad).sin()
            - M4 * (6.0 * lat_rad).sin());

    let easting = K0
        * n
        * (a + a3 / 6.0 * (1.0 - lat_tan2 + c)
            + a5 / 120.0 * (5.0 - 18.0 * lat_tan2 + lat_tan4 + 72.0 * c - 58.0 * E_P2))
        + 500_000.0;

    let mut northing = K0
        * (m + n
            * lat_tan
            * (a2 / 2.0
                + a4 / 24.0 * (5.0 - lat_tan2 + 9.0 * c + 4.0 * c * c)
                + a6 / 720.0
                    * (61.0 - 58.0 * lat_tan2 + lat_tan4 + 600.0 * c - 330.0 * E_P2)));

    if point.lat() < 0.0 {
        northing += 10_000_000.0;
    }

    (easting, northing)
}

/// Invert the projection for a coordinate known to lie in `zone`.
pub fn unproject(east: f64, north: f64, zone: UtmZone) -> Result<GeoPoint> {
    let sqrt_e = (1.0 - E).sqrt();
    let e_ = (1.0 - sqrt_e) / (1.0 + sqrt_e);
    let e2 = e_ * e_;
    let e3 = e2 * e_;
    let e4 = e3 * e_;
    let e5 = e4 * e_;

    let p2 = 3.0 / 2.0 * e_ - 27.0 / 32.0 * e3 + 269.0 / 512.0 * e5;
    let p3 = 21.0 / 16.0 * e2 - 55.0 / 32.0 * e4;
    let p4 = 151.0 / 96.0 * e3 - 417.0 / 128.0 * e5;
    let p5 = 1097.0 / 512.0 * e4;

    let x = east - 500_000.0;
    let y = if zone.is_northern() {
        north
    } else {
        north - 10_000_000.0
    };

    let m = y / K0;
    let mu = m / (R * M1);

    let p_rad = mu
        + p2 * (2.0 * mu).sin()
        + p3 * (4.0 * mu).sin()
        + p4 * (6.0 * mu).sin()
        + p5 * (8.0 * mu).sin();

    let p_sin = p_rad.sin();
    let p_sin2 = p_sin * p_sin;
    let p_cos = p_rad.cos();
    let p_tan = p_sin / p_cos;
    let p_tan2 = p_tan * p_tan;
    let p_tan4 = p_tan2 * p_tan2;

    let ep_sin = 1.0 - E * p_sin2;
    let n = R / ep_sin.sqrt();
    let r = (1.0 - E) / ep_sin;

    let c = E_P2 * p_cos * p_cos;
    let c2 = c * c;

    let d = x / (n * K0);
    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let lat = p_rad
        - (p_tan / r)
            * (d2 / 2.0 - d4 / 24.0 * (5.0 + 3.0 * p_tan2 + 10.0 * c - 4.0 * c2 - 9.0 * E_P2)
                + d6 / 720.0
                    * (61.0 + 90.0 * p_tan2 + 298.0 * c + 45.0 * p_tan4 - 252.0 * E_P2
                        - 3.0 * c2));

    let lon = wrap_degrees(
        ((d - d3 / 6.0 * (1.0 + 2.0 * p_tan2 + c)
            + d5 / 120.0
                * (5.0 - 2.0 * c + 28.0 * p_tan2 - 3.0 * c2 + 8.0 * E_P2 + 24.0 * p_tan4))
            / p_cos)
            .to_degrees()
            + central_longitude(zone.number),
    );

    Ok(GeoPoint::new(lat.to_degrees(), lon)?)
}

/// Project a batch of points into one shared UTM zone.
///
/// The zone is taken from the first point. The batch is rejected with
/// [`ProjectionError::RegionTooLarge`] when any truncated easting ends up
/// more than 400 km from the zone's central meridian, or when the points
/// span more than one latitude band.
pub fn project_batch(points: &[GeoPoint]) -> Result<(Vec<UtmCoord>, UtmZone)> {
    let first = match points.first() {
        Some(p) => p,
        None => return Err(ProjectionError::EmptyBatch),
    };
    let zone = UtmZone {
        number: zone_number(first.lat(), first.lon()),
        letter: zone_letter(first.lat())?,
    };

    let mut coords = Vec::with_capacity(points.len());
    let mut spread: i64 = 0;
    for point in points {
        if zone_letter(point.lat())? != zone.letter {
            return Err(region_too_large(points));
        }
        let (easting, northing) = forward(point, zone.number);
        let coord = UtmCoord {
            east: easting as i64,
            north: northing as i64,
        };
        spread = spread.max((coord.east - 500_000).abs());
        coords.push(coord);
    }

    if spread > 400_000 {
        return Err(region_too_large(points));
    }

    Ok((coords, zone))
}

fn region_too_large(points: &[GeoPoint]) -> ProjectionError {
    let mut lat_min = f64::INFINITY;
    let mut lat_max = f64::NEG_INFINITY;
    let mut lon_min = f64::INFINITY;
    let mut lon_max = f64::NEG_INFINITY;
    for point in points {
        lat_min = lat_min.min(point.lat());
        lat_max = lat_max.max(point.lat());
        lon_min = lon_min.min(point.lon());
        lon_max = lon_max.max(point.lon());
    }
    ProjectionError::RegionTooLarge {
        lat_min,
        lat_max,
        lon_min,
        lon_max,
    }
}
