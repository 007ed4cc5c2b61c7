//! Great-circle distance and geofence membership
//!
//! Distances use the haversine formula on a spherical Earth of radius
//! 6371 km. Radius membership is inclusive: a point exactly on the boundary
//! is inside.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean Earth radius (km)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Radius around a vendor inside which payments settle immediately (km)
pub const PAYMENT_GEOFENCE_KM: f64 = 20.0;

/// Validated WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Create a point, rejecting out-of-range (or NaN) coordinates
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidLatitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidLongitude(longitude));
        }
        Ok(Self { latitude, longitude })
    }

    /// Latitude in degrees
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Distance to another point (km)
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        distance_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Haversine distance between two coordinate pairs (km).
///
/// Inputs are expected to be in range; callers validate through
/// [`GeoPoint::new`] before calling.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat_distance = (lat2 - lat1).to_radians();
    let lon_distance = (lon2 - lon1).to_radians();

    let a = (lat_distance / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (lon_distance / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Whether two points lie within `radius_km` of each other (inclusive)
pub fn within_radius(p1: &GeoPoint, p2: &GeoPoint, radius_km: f64) -> bool {
    p1.distance_to(p2) <= radius_km
}

/// Outcome of a geofence check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceVerdict {
    /// Measured distance (km)
    pub distance_km: f64,
    /// Whether the point is inside the fence
    pub within: bool,
}

/// Circular fence around an anchor point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geofence {
    radius_km: f64,
}

impl Geofence {
    /// Fence with an explicit radius
    pub fn new(radius_km: f64) -> Self {
        Self { radius_km }
    }

    /// The fixed payment policy fence
    pub fn payments() -> Self {
        Self::new(PAYMENT_GEOFENCE_KM)
    }

    /// Radius (km)
    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Check `point` against a fence centred on `anchor`
    pub fn check(&self, anchor: &GeoPoint, point: &GeoPoint) -> GeofenceVerdict {
        let distance_km = anchor.distance_to(point);
        GeofenceVerdict {
            distance_km,
            within: distance_km <= self.radius_km,
        }
    }
}

impl Default for Geofence {
    fn default() -> Self {
        Self::payments()
    }
}
