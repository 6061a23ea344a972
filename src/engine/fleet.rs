use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::geofence::detect_transitions;
use crate::engine::location::announce_transitions;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus, GeoPoint, VehicleType};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct DriverDraft {
    pub name: String,
    pub vehicle_type: VehicleType,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default = "default_true")]
    pub is_verified: bool,
}

fn default_true() -> bool {
    true
}

pub fn register_driver(state: &AppState, draft: DriverDraft) -> Result<Driver, AppError> {
    if draft.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    if let Some(location) = &draft.location {
        if !location.is_valid() {
            return Err(AppError::Validation("invalid driver location".to_string()));
        }
    }

    let now = Utc::now();
    let driver = Driver {
        id: Uuid::new_v4(),
        name: draft.name.trim().to_string(),
        location: draft.location,
        last_location_update: draft.location.map(|_| now),
        status: DriverStatus::Offline,
        is_active: true,
        is_verified: draft.is_verified,
        average_rating: draft.average_rating.clamp(0.0, 5.0),
        vehicle_type: draft.vehicle_type,
        active_orders: 0,
        updated_at: now,
    };

    // The starting position is the driver's first zone membership, so it
    // yields `enter` events before the driver becomes visible to reports.
    if let Some(location) = &driver.location {
        let transitions = detect_transitions(state, driver.id, None, location, now);
        announce_transitions(state, driver.id, &transitions.events);
    }

    state.drivers.insert(driver.id, driver.clone());
    info!(driver_id = %driver.id, vehicle_type = ?driver.vehicle_type, "driver registered");

    Ok(driver)
}

/// Status changes reported by the driver app. `busy` is owned by the
/// allocation engine and cannot be set here.
pub fn set_driver_status(
    state: &AppState,
    driver_id: Uuid,
    status: DriverStatus,
) -> Result<Driver, AppError> {
    if status == DriverStatus::Busy {
        return Err(AppError::Validation(
            "busy is set by the allocation engine".to_string(),
        ));
    }

    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    driver.status = status;
    driver.updated_at = Utc::now();
    info!(driver_id = %driver_id, status = ?status, "driver status changed");

    Ok(driver.clone())
}

pub fn list_drivers(state: &AppState) -> Vec<Driver> {
    let mut drivers: Vec<Driver> = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    drivers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    drivers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geofence::events_for_driver;
    use crate::engine::location::record_driver_location;
    use crate::models::event::{DispatchEvent, GeofenceEventType};
    use crate::test_support::{add_zone, square, test_state};

    fn draft(name: &str) -> DriverDraft {
        DriverDraft {
            name: name.to_string(),
            vehicle_type: VehicleType::Motorcycle,
            location: None,
            average_rating: 9.0,
            is_verified: true,
        }
    }

    #[test]
    fn registered_drivers_start_offline_with_clamped_rating() {
        let state = test_state();
        let driver = register_driver(&state, draft("Asha")).unwrap();
        assert_eq!(driver.status, DriverStatus::Offline);
        assert_eq!(driver.average_rating, 5.0);
        assert!(driver.last_location_update.is_none());
    }

    #[test]
    fn busy_cannot_be_set_directly() {
        let state = test_state();
        let driver = register_driver(&state, draft("Ravi")).unwrap();
        assert!(set_driver_status(&state, driver.id, DriverStatus::Busy).is_err());
        assert_eq!(
            set_driver_status(&state, driver.id, DriverStatus::Online).unwrap().status,
            DriverStatus::Online
        );
    }

    #[test]
    fn starting_inside_a_zone_counts_as_entering_it() {
        let state = test_state();
        let zone = add_zone(&state, square(0.0, 0.0, 1.0), 0);
        let mut events_rx = state.events_tx.subscribe();

        let mut inside = draft("Meena");
        inside.location = Some(GeoPoint::new(0.5, 0.5));
        let driver = register_driver(&state, inside).unwrap();

        let log = events_for_driver(&state, driver.id);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].zone_id, zone.id);
        assert_eq!(log[0].event_type, GeofenceEventType::Enter);
        assert!(matches!(events_rx.try_recv(), Ok(DispatchEvent::ZoneEntered(_))));

        let update = record_driver_location(&state, driver.id, GeoPoint::new(0.6, 0.6)).unwrap();
        assert_eq!(update.zone_ids, vec![zone.id]);
        assert!(update.events.is_empty());
        assert_eq!(events_for_driver(&state, driver.id).len(), 1);
    }
}
