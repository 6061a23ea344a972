use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::geofence::zones_containing;
use crate::engine::surge;
use crate::error::AppError;
use crate::models::driver::{GeoPoint, VehicleType};
use crate::models::order::{AllocationState, OrderStatus};
use crate::models::zone::{Zone, ZoneType};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceabilityQuery {
    #[serde(default)]
    pub merchant_id: Option<Uuid>,
    #[serde(default)]
    pub order_value: Option<f64>,
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Restriction {
    OrderValueBelowMinimum { minimum: f64 },
    OrderValueAboveMaximum { maximum: f64 },
    VehicleNotAllowed { vehicle_type: VehicleType },
    OutsideOperatingHours,
    RestrictedArea,
    ZoneAtCapacity { max_concurrent_orders: u32 },
}

#[derive(Debug, Clone, Serialize)]
pub struct Serviceability {
    pub is_in_zone: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<Zone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surge_multiplier: Option<f64>,
    pub restrictions: Vec<Restriction>,
}

impl Serviceability {
    fn outside() -> Self {
        Self {
            is_in_zone: false,
            zone: None,
            delivery_fee: None,
            estimated_time_minutes: None,
            surge_multiplier: None,
            restrictions: Vec::new(),
        }
    }

    pub fn is_serviceable(&self) -> bool {
        self.is_in_zone && self.restrictions.is_empty()
    }
}

pub fn check_serviceability(
    state: &AppState,
    location: &GeoPoint,
    query: &ServiceabilityQuery,
) -> Result<Serviceability, AppError> {
    check_serviceability_at(state, location, query, Utc::now())
}

pub fn check_serviceability_at(
    state: &AppState,
    location: &GeoPoint,
    query: &ServiceabilityQuery,
    now: DateTime<Utc>,
) -> Result<Serviceability, AppError> {
    if !location.is_valid() {
        return Err(AppError::Validation(format!(
            "invalid coordinates ({}, {})",
            location.lat, location.lng
        )));
    }

    let Some(zone) = serving_zone(state, location, query.merchant_id) else {
        state
            .metrics
            .serviceability_checks_total
            .with_label_values(&["outside"])
            .inc();
        return Ok(Serviceability::outside());
    };

    let restrictions = restrictions_for(state, &zone, query, now);
    let multiplier = surge::current_multiplier_at(state, zone.id, now)?;
    let delivery_fee = round_currency(zone.properties.base_delivery_fee * multiplier);

    let result = if restrictions.is_empty() {
        "serviceable"
    } else {
        "restricted"
    };
    state
        .metrics
        .serviceability_checks_total
        .with_label_values(&[result])
        .inc();

    Ok(Serviceability {
        is_in_zone: true,
        delivery_fee: Some(delivery_fee),
        estimated_time_minutes: Some(zone.properties.estimated_delivery_minutes),
        surge_multiplier: Some(multiplier),
        restrictions,
        zone: Some(zone),
    })
}

/// Highest-priority active zone containing the point. Zones owned by another
/// merchant are skipped when a merchant is given.
pub fn serving_zone(state: &AppState, location: &GeoPoint, merchant_id: Option<Uuid>) -> Option<Zone> {
    zones_containing(state, location)
        .into_iter()
        .filter(|zone| match (zone.merchant_id, merchant_id) {
            (Some(owner), Some(merchant)) => owner == merchant,
            _ => true,
        })
        .max_by(|a, b| {
            a.properties
                .priority
                .cmp(&b.properties.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
        })
}

/// Collects every restriction that applies; none short-circuits the others.
fn restrictions_for(
    state: &AppState,
    zone: &Zone,
    query: &ServiceabilityQuery,
    now: DateTime<Utc>,
) -> Vec<Restriction> {
    let props = &zone.properties;
    let mut restrictions = Vec::new();

    if zone.zone_type == ZoneType::Restricted {
        restrictions.push(Restriction::RestrictedArea);
    }

    if let Some(value) = query.order_value {
        if let Some(minimum) = props.min_order_value {
            if value < minimum {
                restrictions.push(Restriction::OrderValueBelowMinimum { minimum });
            }
        }
        if let Some(maximum) = props.max_order_value {
            if value > maximum {
                restrictions.push(Restriction::OrderValueAboveMaximum { maximum });
            }
        }
    }

    if let Some(vehicle_type) = query.vehicle_type {
        if !props.allows_vehicle(vehicle_type) {
            restrictions.push(Restriction::VehicleNotAllowed { vehicle_type });
        }
    }

    if let Some(hours) = props.operating_hours {
        if !hours.contains(surge::local_time(state, now).time()) {
            restrictions.push(Restriction::OutsideOperatingHours);
        }
    }

    if let Some(max_concurrent_orders) = props.max_concurrent_orders {
        if open_orders_in_zone(state, zone.id) >= max_concurrent_orders as usize {
            restrictions.push(Restriction::ZoneAtCapacity {
                max_concurrent_orders,
            });
        }
    }

    restrictions
}

fn open_orders_in_zone(state: &AppState, zone_id: Uuid) -> usize {
    state
        .orders
        .iter()
        .filter(|entry| {
            entry.zone_id == Some(zone_id)
                && entry.allocation != AllocationState::Delivered
                && !matches!(entry.status, OrderStatus::Delivered | OrderStatus::Cancelled)
        })
        .count()
}

fn round_currency(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
