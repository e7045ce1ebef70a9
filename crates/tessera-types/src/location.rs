use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Tolerance used when comparing coordinates.
///
/// Geo indexes store points with limited precision, so a recovered location
/// is only approximately the one written.
pub const EPSILON: f64 = 0.00001;

/// A geographic point.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Location {
    /// Longitude, strictly between -180 and 180.
    pub lon: f64,
    /// Latitude, strictly between -90 and 90.
    pub lat: f64,
}

impl Location {
    /// Create a location, rejecting out-of-range coordinates.
    pub fn new(lon: f64, lat: f64) -> Result<Self, TypeError> {
        if !(lon > -180.0 && lon < 180.0) {
            return Err(TypeError::InvalidLocation(format!(
                "longitude {lon} out of range"
            )));
        }
        if !(lat > -90.0 && lat < 90.0) {
            return Err(TypeError::InvalidLocation(format!(
                "latitude {lat} out of range"
            )));
        }
        Ok(Self { lon, lat })
    }

    /// Parse a `"lon,lat"` string.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let (lon, lat) = s
            .split_once(',')
            .ok_or_else(|| TypeError::InvalidLocation(s.to_string()))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|_| TypeError::InvalidLocation(s.to_string()))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| TypeError::InvalidLocation(s.to_string()))?;
        Self::new(lon, lat)
    }

    /// JSON presentation: `{"lat": .., "lon": ..}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "lat": self.lat, "lon": self.lon })
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        (self.lat - other.lat).abs() < EPSILON && (self.lon - other.lon).abs() < EPSILON
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lon, self.lat)
    }
}
