use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Bicycle,
    Motorcycle,
    Car,
    Van,
    Truck,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Offline,
    Online,
    Busy,
    OnDelivery,
}

/// Candidate view of a driver as seen by the allocation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub location: Option<GeoPoint>,
    pub last_location_update: Option<DateTime<Utc>>,
    pub status: DriverStatus,
    pub is_active: bool,
    pub is_verified: bool,
    pub average_rating: f64,
    pub vehicle_type: VehicleType,
    pub active_orders: u32,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    /// Status/flag/capacity part of eligibility; location-based filters are
    /// applied by the caller.
    pub fn can_take_order(&self, max_active_orders: u32) -> bool {
        self.status == DriverStatus::Online
            && self.is_active
            && self.is_verified
            && self.active_orders < max_active_orders
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSample {
    pub location: GeoPoint,
    pub recorded_at: DateTime<Utc>,
}
