//! Fixtures shared by the unit tests.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::models::driver::{Driver, DriverStatus, GeoPoint, VehicleType};
use crate::models::order::{AllocationState, Order, OrderStatus, Priority};
use crate::models::surge::{SurgeCondition, SurgeRule};
use crate::models::zone::{Zone, ZoneProperties, ZoneType};
use crate::state::AppState;

pub fn test_state() -> AppState {
    test_state_with(DispatchConfig::default())
}

pub fn test_state_with(config: DispatchConfig) -> AppState {
    let (state, _rx) = AppState::new(config, 64, 64);
    state
}

pub fn properties(base_delivery_fee: f64) -> ZoneProperties {
    ZoneProperties {
        base_delivery_fee,
        min_order_value: None,
        max_order_value: None,
        estimated_delivery_minutes: 35,
        priority: 0,
        operating_hours: None,
        allowed_vehicle_types: Vec::new(),
        max_concurrent_orders: None,
    }
}

/// Axis-aligned square with its south-west corner at (`lat`, `lng`).
pub fn square(lat: f64, lng: f64, size: f64) -> Vec<GeoPoint> {
    vec![
        GeoPoint::new(lat, lng),
        GeoPoint::new(lat, lng + size),
        GeoPoint::new(lat + size, lng + size),
        GeoPoint::new(lat + size, lng),
    ]
}

pub fn add_zone(state: &AppState, polygon: Vec<GeoPoint>, priority: i32) -> Zone {
    let mut props = properties(30.0);
    props.priority = priority;
    let now = Utc::now();
    let zone = Zone {
        id: Uuid::new_v4(),
        name: format!("zone-{priority}"),
        zone_type: ZoneType::Delivery,
        polygon,
        properties: props,
        is_active: true,
        merchant_id: None,
        created_at: now,
        updated_at: now,
    };
    state.zones.insert(zone.id, zone.clone());
    zone
}

pub fn add_rule(
    state: &AppState,
    zone_id: Uuid,
    condition: SurgeCondition,
    multiplier: f64,
) -> SurgeRule {
    let rule = SurgeRule {
        id: Uuid::new_v4(),
        zone_id,
        name: condition.kind().to_string(),
        condition,
        multiplier,
        priority: 0,
        is_active: true,
        created_at: Utc::now(),
    };
    state.surge_rules.insert(rule.id, rule.clone());
    rule
}

/// Online, active, verified car driver that just reported its position.
pub fn add_driver(state: &AppState, lat: f64, lng: f64, rating: f64) -> Driver {
    let now = Utc::now();
    let driver = Driver {
        id: Uuid::new_v4(),
        name: "test-driver".to_string(),
        location: Some(GeoPoint::new(lat, lng)),
        last_location_update: Some(now),
        status: DriverStatus::Online,
        is_active: true,
        is_verified: true,
        average_rating: rating,
        vehicle_type: VehicleType::Car,
        active_orders: 0,
        updated_at: now,
    };
    state.drivers.insert(driver.id, driver.clone());
    driver
}

pub fn add_order(
    state: &AppState,
    pickup: GeoPoint,
    zone_id: Option<Uuid>,
    created_at: DateTime<Utc>,
) -> Order {
    let order = Order {
        id: Uuid::new_v4(),
        merchant_id: None,
        pickup,
        dropoff: GeoPoint::new(pickup.lat + 0.01, pickup.lng + 0.01),
        total_value: 250.0,
        is_cod: false,
        delivery_fee: Some(30.0),
        zone_id,
        priority: Priority::Normal,
        status: OrderStatus::ReadyForPickup,
        allocation: AllocationState::Unassigned,
        driver_id: None,
        history: Vec::new(),
        created_at,
        updated_at: created_at,
    };
    state.orders.insert(order.id, order.clone());
    order
}
