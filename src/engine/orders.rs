use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::serviceability::{ServiceabilityQuery, check_serviceability};
use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::order::{AllocationState, Order, OrderStatus, Priority};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct OrderDraft {
    #[serde(default)]
    pub merchant_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub total_value: f64,
    #[serde(default)]
    pub is_cod: bool,
    #[serde(default)]
    pub priority: Priority,
}

/// Accepts an order only when its delivery location is serviceable, stamping
/// the serving zone and the surged delivery fee.
pub fn create_order(state: &AppState, draft: OrderDraft) -> Result<Order, AppError> {
    if !draft.pickup.is_valid() || !draft.dropoff.is_valid() {
        return Err(AppError::Validation("invalid pickup or dropoff coordinates".to_string()));
    }
    if !draft.total_value.is_finite() || draft.total_value < 0.0 {
        return Err(AppError::Validation(
            "total_value must be a non-negative number".to_string(),
        ));
    }

    let query = ServiceabilityQuery {
        merchant_id: draft.merchant_id,
        order_value: Some(draft.total_value),
        vehicle_type: None,
    };
    let serviceability = check_serviceability(state, &draft.dropoff, &query)?;

    let Some(zone) = serviceability.zone.as_ref() else {
        return Err(AppError::Validation(
            "delivery location is outside every service zone".to_string(),
        ));
    };
    if !serviceability.restrictions.is_empty() {
        let kinds: Vec<String> = serviceability
            .restrictions
            .iter()
            .map(|r| format!("{r:?}"))
            .collect();
        return Err(AppError::Validation(format!(
            "order violates zone restrictions: {}",
            kinds.join(", ")
        )));
    }

    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        merchant_id: draft.merchant_id,
        pickup: draft.pickup,
        dropoff: draft.dropoff,
        total_value: draft.total_value,
        is_cod: draft.is_cod,
        delivery_fee: serviceability.delivery_fee,
        zone_id: Some(zone.id),
        priority: draft.priority,
        status: OrderStatus::ReadyForPickup,
        allocation: AllocationState::Unassigned,
        driver_id: None,
        history: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    state.orders.insert(order.id, order.clone());
    info!(
        order_id = %order.id,
        zone_id = %zone.id,
        delivery_fee = ?order.delivery_fee,
        "order accepted"
    );

    Ok(order)
}
