//! Risk Engine for GeoPay
//!
//! Location checks applied to every payment before it touches the ledger.
//!
//! The only signal in use today is distance: a payment made further than the
//! payment geofence from the vendor is held for manual review instead of
//! being settled.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod geo;

pub use error::{Error, Result};
pub use geo::{distance_km, within_radius, GeoPoint, Geofence, GeofenceVerdict, PAYMENT_GEOFENCE_KM};
