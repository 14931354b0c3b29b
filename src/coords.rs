//! Coordinate normalization.
//!
//! Raw `"lat,lng"` strings arrive from the device locator, the ajax channel
//! or a manual form. Before they are compared with or written to the module
//! params they are brought into a canonical form: whitespace stripped and
//! at most four fractional digits per axis (truncated, never rounded or
//! padded).

use std::fmt;
use thiserror::Error;

/// Maximum number of fractional digits kept per axis.
const PRECISION: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinateError {
    #[error("coordinates must be two comma separated values, got '{0}'")]
    MissingComma(String),
    #[error("{axis} value '{value}' has no decimal point")]
    MissingDecimal { axis: &'static str, value: String },
    #[error("{axis} value '{value}' is not a decimal number")]
    Malformed { axis: &'static str, value: String },
}

/// A normalized latitude/longitude pair.
///
/// Both axes are kept as text so that truncation is exact and the stored
/// form never picks up float formatting noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinate {
    lat: Axis,
    lng: Axis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Axis {
    int: String,
    frac: String,
}

impl Coordinate {
    /// Parses and normalizes a raw `"lat,lng"` string.
    ///
    /// Only the first comma and the first decimal point of each half are
    /// significant. Input that does not describe two decimal numbers is
    /// rejected instead of being passed through half-normalized.
    pub fn parse(raw: &str) -> Result<Self, CoordinateError> {
        let (lat, lng) = raw
            .split_once(',')
            .ok_or_else(|| CoordinateError::MissingComma(raw.trim().to_string()))?;

        Ok(Self {
            lat: Axis::parse("latitude", lat)?,
            lng: Axis::parse("longitude", lng)?,
        })
    }

    pub fn latitude(&self) -> String {
        self.lat.to_string()
    }

    pub fn longitude(&self) -> String {
        self.lng.to_string()
    }
}

impl Axis {
    fn parse(axis: &'static str, raw: &str) -> Result<Self, CoordinateError> {
        let (int, frac) = raw
            .split_once('.')
            .ok_or_else(|| CoordinateError::MissingDecimal {
                axis,
                value: raw.trim().to_string(),
            })?;

        // Truncate first, then trim, so trailing padding never counts as a digit.
        let frac: String = frac.chars().take(PRECISION).collect();
        let int = int.trim();
        let frac = frac.trim();

        let digits = int.strip_prefix('-').unwrap_or(int);
        let valid = !digits.is_empty()
            && !frac.is_empty()
            && digits.chars().all(|c| c.is_ascii_digit())
            && frac.chars().all(|c| c.is_ascii_digit());

        if !valid {
            return Err(CoordinateError::Malformed {
                axis,
                value: raw.trim().to_string(),
            });
        }

        Ok(Self {
            int: int.to_string(),
            frac: frac.to_string(),
        })
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.int, self.frac)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// Normalizes a raw coordinate string into its canonical `"lat,lng"` form.
pub fn normalize_coordinates(raw: &str) -> Result<String, CoordinateError> {
    Coordinate::parse(raw).map(|c| c.to_string())
}

/// Splits a geolocation string into its two halves, as used for map pins.
///
/// Missing halves come back empty rather than failing; the value may be a
/// free-form override and not a coordinate at all.
pub fn split_geolocation(geolocation: &str) -> (String, String) {
    match geolocation.split_once(',') {
        Some((lat, lng)) => (lat.trim().to_string(), lng.trim().to_string()),
        None => (geolocation.trim().to_string(), String::new()),
    }
}
