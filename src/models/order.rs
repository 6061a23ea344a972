use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    ReadyForPickup,
    DriverAssigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

/// Allocation lifecycle, tracked separately from the overall order status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AllocationState {
    Unassigned,
    Searching,
    Assigned,
    Released,
    Delivered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub merchant_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub total_value: f64,
    pub is_cod: bool,
    pub delivery_fee: Option<f64>,
    pub zone_id: Option<Uuid>,
    pub priority: Priority,
    pub status: OrderStatus,
    pub allocation: AllocationState,
    pub driver_id: Option<Uuid>,
    pub history: Vec<AllocationTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationTransition {
    pub from: AllocationState,
    pub to: AllocationState,
    pub driver_id: Option<Uuid>,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl Order {
    pub fn transition(
        &mut self,
        to: AllocationState,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.history.push(AllocationTransition {
            from: self.allocation,
            to,
            driver_id: self.driver_id,
            reason,
            at,
        });
        self.allocation = to;
        self.updated_at = at;
    }

    pub fn is_claimable(&self) -> bool {
        self.driver_id.is_none()
            && matches!(
                self.allocation,
                AllocationState::Unassigned | AllocationState::Searching
            )
            && self.status == OrderStatus::ReadyForPickup
    }

    /// Orders still waiting for a driver.
    pub fn is_pending(&self) -> bool {
        self.driver_id.is_none()
            && self.status == OrderStatus::ReadyForPickup
            && !matches!(self.allocation, AllocationState::Delivered)
    }
}
