use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::{GeoPoint, VehicleType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Delivery,
    Pickup,
    Restricted,
    Surge,
    Warehouse,
}

/// Daily opening window in local time. `close` earlier than `open` means the
/// window runs past midnight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OperatingHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl OperatingHours {
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.open == self.close {
            return true;
        }
        if self.open < self.close {
            time >= self.open && time < self.close
        } else {
            time >= self.open || time < self.close
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneProperties {
    pub base_delivery_fee: f64,
    #[serde(default)]
    pub min_order_value: Option<f64>,
    #[serde(default)]
    pub max_order_value: Option<f64>,
    pub estimated_delivery_minutes: u32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub operating_hours: Option<OperatingHours>,
    /// Empty means every vehicle type is allowed.
    #[serde(default)]
    pub allowed_vehicle_types: Vec<VehicleType>,
    #[serde(default)]
    pub max_concurrent_orders: Option<u32>,
}

impl ZoneProperties {
    pub fn allows_vehicle(&self, vehicle: VehicleType) -> bool {
        self.allowed_vehicle_types.is_empty() || self.allowed_vehicle_types.contains(&vehicle)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    pub zone_type: ZoneType,
    pub polygon: Vec<GeoPoint>,
    pub properties: ZoneProperties,
    pub is_active: bool,
    pub merchant_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneDraft {
    pub name: String,
    pub zone_type: ZoneType,
    pub polygon: Vec<GeoPoint>,
    pub properties: ZoneProperties,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub merchant_id: Option<Uuid>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZonePatch {
    pub name: Option<String>,
    pub zone_type: Option<ZoneType>,
    pub polygon: Option<Vec<GeoPoint>>,
    pub properties: Option<ZoneProperties>,
    pub is_active: Option<bool>,
    pub merchant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZoneFilter {
    pub zone_type: Option<ZoneType>,
    pub merchant_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

impl ZoneFilter {
    pub fn matches(&self, zone: &Zone) -> bool {
        self.zone_type.is_none_or(|t| zone.zone_type == t)
            && self.merchant_id.is_none_or(|m| zone.merchant_id == Some(m))
            && self.is_active.is_none_or(|a| zone.is_active == a)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneStatistics {
    pub zone_id: Uuid,
    pub area_km2: f64,
    pub centroid: GeoPoint,
    pub vertex_count: usize,
    pub online_drivers: usize,
    pub pending_orders: usize,
    pub recent_orders: usize,
    pub active_rules: usize,
    pub surge_multiplier: f64,
}
