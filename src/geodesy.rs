//! Geodesic distance between two coordinates.
//!
//! The update handler only sees the [`Geodesy`] trait, so tests can swap in a
//! counting or failing provider. [`KarneyGeodesic`] is the production
//! provider: the WGS-84 ellipsoidal geodesic from the `geo` crate.

use geo::{Distance, Geodesic, Point};
use serde::Deserialize;
use std::fmt;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// Why a distance could not be computed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeodesyError {
    /// A coordinate field holds something that is not a number.
    #[error("{field} value {value} is not a number")]
    NotANumber {
        /// Field name, `latitude` or `longitude`
        field: &'static str,
        /// The offending value as received
        value: String,
    },

    /// NaN or infinity.
    #[error("{field} must be a finite number, got {value}")]
    NonFinite {
        /// Field name, `latitude` or `longitude`
        field: &'static str,
        /// The offending value
        value: f64,
    },

    /// Latitude outside the [-90, 90] range.
    #[error("Latitude must be in the [-90; 90] range, got {0}")]
    LatitudeOutOfRange(f64),

    /// The provider itself failed.
    #[error("{0}")]
    Provider(String),
}

/// A provider of geodesic distances.
pub trait Geodesy: Send + Sync {
    /// Distance in meters between `from` and `to`.
    fn distance_m(&self, from: Coordinate, to: Coordinate) -> Result<f64, GeodesyError>;
}

/// Karney's geodesic on the WGS-84 ellipsoid.
///
/// Accurate to a few nanometers anywhere on the ellipsoid, including
/// nearly antipodal points where Vincenty fails to converge.
#[derive(Debug, Clone, Copy, Default)]
pub struct KarneyGeodesic;

impl KarneyGeodesic {
    fn check(coord: Coordinate) -> Result<(), GeodesyError> {
        for (field, value) in [("latitude", coord.latitude), ("longitude", coord.longitude)] {
            if !value.is_finite() {
                return Err(GeodesyError::NonFinite { field, value });
            }
        }
        if !(-90.0..=90.0).contains(&coord.latitude) {
            return Err(GeodesyError::LatitudeOutOfRange(coord.latitude));
        }
        Ok(())
    }
}

impl Geodesy for KarneyGeodesic {
    fn distance_m(&self, from: Coordinate, to: Coordinate) -> Result<f64, GeodesyError> {
        Self::check(from)?;
        Self::check(to)?;

        // geo points are (x = longitude, y = latitude)
        let a = Point::new(from.longitude, from.latitude);
        let b = Point::new(to.longitude, to.latitude);
        let meters = Geodesic::distance(a, b);

        if meters.is_finite() {
            Ok(meters)
        } else {
            Err(GeodesyError::Provider(format!(
                "geodesic solver returned {} for {} -> {}",
                meters, from, to
            )))
        }
    }
}
