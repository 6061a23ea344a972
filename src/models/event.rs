use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::assignment::Assignment;
use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceEventType {
    Enter,
    Exit,
    Dwell,
}

impl GeofenceEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeofenceEventType::Enter => "enter",
            GeofenceEventType::Exit => "exit",
            GeofenceEventType::Dwell => "dwell",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceEvent {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub zone_id: Uuid,
    pub event_type: GeofenceEventType,
    pub location: GeoPoint,
    pub timestamp: DateTime<Utc>,
}

/// Events published to the notification side.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    ZoneEntered(GeofenceEvent),
    ZoneExited(GeofenceEvent),
    DriverAssigned(Assignment),
    DriverReassigned {
        order_id: Uuid,
        previous_driver_id: Uuid,
        reason: String,
    },
    OrderUnassignable {
        order_id: Uuid,
        reason: String,
    },
}

impl DispatchEvent {
    pub fn from_geofence(event: GeofenceEvent) -> Option<Self> {
        match event.event_type {
            GeofenceEventType::Enter => Some(DispatchEvent::ZoneEntered(event)),
            GeofenceEventType::Exit => Some(DispatchEvent::ZoneExited(event)),
            GeofenceEventType::Dwell => None,
        }
    }
}
