//! Great-circle distance and delivery ETA estimation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Errors from constructing geo values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("Latitude out of range [-90, 90]: {0}")]
    InvalidLatitude(f64),
    #[error("Longitude out of range [-180, 180]: {0}")]
    InvalidLongitude(f64),
    #[error("Average speed must be positive: {0}")]
    InvalidSpeed(f64),
}

/// A WGS84 coordinate in degrees.
///
/// Deserializing goes through [`GeoPoint::new`], so stored points are range
/// checked like constructed ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = GeoError;

    fn try_from(raw: RawGeoPoint) -> Result<Self, Self::Error> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl GeoPoint {
    /// Create a point, rejecting out-of-range coordinates.
    ///
    /// # Errors
    ///
    /// Returns `GeoError` if either coordinate is outside its valid range or NaN.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::InvalidLatitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// The delivery address the user picked last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedAddress {
    /// Human label ("Home", "Office", a street line).
    pub label: String,
    pub location: GeoPoint,
}

/// Great-circle distance between two points in kilometres.
#[must_use]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Parameters for turning a distance into a delivery time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaModel {
    average_speed_kmh: f64,
    preparation_minutes: u32,
}

impl EtaModel {
    /// Default courier speed.
    pub const DEFAULT_SPEED_KMH: f64 = 30.0;
    /// Default time for the store to prepare an order.
    pub const DEFAULT_PREPARATION_MINUTES: u32 = 10;

    /// Create a model.
    ///
    /// # Errors
    ///
    /// Returns `GeoError::InvalidSpeed` if the speed is not a positive number.
    pub fn new(average_speed_kmh: f64, preparation_minutes: u32) -> Result<Self, GeoError> {
        if !(average_speed_kmh.is_finite() && average_speed_kmh > 0.0) {
            return Err(GeoError::InvalidSpeed(average_speed_kmh));
        }
        Ok(Self {
            average_speed_kmh,
            preparation_minutes,
        })
    }

    #[must_use]
    pub const fn average_speed_kmh(&self) -> f64 {
        self.average_speed_kmh
    }

    #[must_use]
    pub const fn preparation_minutes(&self) -> u32 {
        self.preparation_minutes
    }
}

impl Default for EtaModel {
    fn default() -> Self {
        Self {
            average_speed_kmh: Self::DEFAULT_SPEED_KMH,
            preparation_minutes: Self::DEFAULT_PREPARATION_MINUTES,
        }
    }
}

/// An estimated delivery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eta {
    pub distance_km: f64,
    /// Preparation plus travel time, rounded up to whole minutes.
    pub minutes: u32,
}

/// Estimate delivery time from `from` (the store) to `to` (the customer).
#[must_use]
pub fn estimate_eta(from: GeoPoint, to: GeoPoint, model: &EtaModel) -> Eta {
    let distance_km = haversine_km(from, to);
    let travel = (distance_km / model.average_speed_kmh * 60.0).ceil();
    // Half the Earth's circumference at walking pace still fits in a u32
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let travel_minutes = travel as u32;

    Eta {
        distance_km,
        minutes: model.preparation_minutes.saturating_add(travel_minutes),
    }
}
