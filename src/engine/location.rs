use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::geofence::detect_transitions;
use crate::engine::surge;
use crate::error::AppError;
use crate::models::driver::{GeoPoint, LocationSample};
use crate::models::event::{DispatchEvent, GeofenceEvent};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct LocationUpdate {
    pub driver_id: Uuid,
    pub location: GeoPoint,
    pub zone_ids: Vec<Uuid>,
    pub events: Vec<GeofenceEvent>,
}

pub fn record_driver_location(
    state: &AppState,
    driver_id: Uuid,
    location: GeoPoint,
) -> Result<LocationUpdate, AppError> {
    record_driver_location_at(state, driver_id, location, Utc::now())
}

/// Stores the new position and runs transition detection while the driver
/// entry is held, so two reports from the same driver never interleave.
pub fn record_driver_location_at(
    state: &AppState,
    driver_id: Uuid,
    location: GeoPoint,
    now: DateTime<Utc>,
) -> Result<LocationUpdate, AppError> {
    if !location.is_valid() {
        return Err(AppError::Validation(format!(
            "invalid coordinates ({}, {})",
            location.lat, location.lng
        )));
    }

    let transitions = {
        let mut driver = state
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        let previous = driver.location.replace(location);
        driver.last_location_update = Some(now);
        driver.updated_at = now;

        detect_transitions(state, driver_id, previous.as_ref(), &location, now)
    };

    append_history(state, driver_id, location, now);
    announce_transitions(state, driver_id, &transitions.events);

    debug!(driver_id = %driver_id, zones = transitions.current_zones.len(), "location recorded");

    Ok(LocationUpdate {
        driver_id,
        location,
        zone_ids: transitions.current_zones,
        events: transitions.events,
    })
}

/// Logs each transition, drops the cached multiplier of the touched zone
/// and publishes the matching dispatch event.
pub(crate) fn announce_transitions(state: &AppState, driver_id: Uuid, events: &[GeofenceEvent]) {
    for event in events {
        info!(
            driver_id = %driver_id,
            zone_id = %event.zone_id,
            event_type = event.event_type.as_str(),
            "geofence transition"
        );
        // Driver counts changed, so shortage-based multipliers must be recomputed.
        surge::invalidate(state, event.zone_id);
        if let Some(dispatch_event) = DispatchEvent::from_geofence(event.clone()) {
            state.publish(dispatch_event);
        }
    }
}

fn append_history(state: &AppState, driver_id: Uuid, location: GeoPoint, now: DateTime<Utc>) {
    let limit = state.config.location.history_limit;
    let mut history = state.location_history.entry(driver_id).or_default();
    history.push(LocationSample {
        location,
        recorded_at: now,
    });
    if history.len() > limit {
        let excess = history.len() - limit;
        history.drain(..excess);
    }
}

pub fn location_history(state: &AppState, driver_id: Uuid) -> Vec<LocationSample> {
    state
        .location_history
        .get(&driver_id)
        .map(|history| history.value().clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::config::DispatchConfig;
    use crate::engine::geofence::events_for_driver;
    use crate::models::event::GeofenceEventType;
    use crate::test_support::{add_driver, add_zone, square, test_state, test_state_with};

    #[test]
    fn crossing_a_boundary_logs_and_publishes() {
        let state = test_state();
        let zone = add_zone(&state, square(0.0, 0.0, 1.0), 0);
        let driver = add_driver(&state, 2.0, 2.0, 4.0);
        let mut events_rx = state.events_tx.subscribe();

        let update = record_driver_location(&state, driver.id, GeoPoint::new(0.5, 0.5)).unwrap();
        assert_eq!(update.zone_ids, vec![zone.id]);
        assert_eq!(update.events.len(), 1);
        assert_eq!(update.events[0].event_type, GeofenceEventType::Enter);
        assert!(matches!(events_rx.try_recv(), Ok(DispatchEvent::ZoneEntered(_))));

        let update = record_driver_location(&state, driver.id, GeoPoint::new(3.0, 3.0)).unwrap();
        assert_eq!(update.events[0].event_type, GeofenceEventType::Exit);
        assert!(matches!(events_rx.try_recv(), Ok(DispatchEvent::ZoneExited(_))));

        assert_eq!(events_for_driver(&state, driver.id).len(), 2);
        let stored = state.drivers.get(&driver.id).unwrap();
        assert_eq!(stored.location, Some(GeoPoint::new(3.0, 3.0)));
    }

    #[test]
    fn unknown_driver_and_bad_coordinates_are_rejected() {
        let state = test_state();
        assert!(matches!(
            record_driver_location(&state, Uuid::new_v4(), GeoPoint::new(0.0, 0.0)),
            Err(AppError::NotFound(_))
        ));

        let driver = add_driver(&state, 0.0, 0.0, 4.0);
        assert!(matches!(
            record_driver_location(&state, driver.id, GeoPoint::new(0.0, 200.0)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn history_is_bounded() {
        let mut config = DispatchConfig::default();
        config.location.history_limit = 3;
        let state = test_state_with(config);
        let driver = add_driver(&state, 0.0, 0.0, 4.0);
        let start = Utc::now();

        for i in 0..5_i32 {
            let point = GeoPoint::new(0.1 * f64::from(i), 0.0);
            record_driver_location_at(&state, driver.id, point, start + Duration::seconds(i64::from(i)))
                .unwrap();
        }

        let history = location_history(&state, driver.id);
        assert_eq!(history.len(), 3);
        assert!((history[0].location.lat - 0.2).abs() < 1e-9);
    }

    #[test]
    fn concurrent_reports_never_duplicate_transitions() {
        let state = Arc::new(test_state());
        add_zone(&state, square(0.0, 0.0, 1.0), 0);
        let driver = add_driver(&state, 5.0, 5.0, 4.0);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = state.clone();
                std::thread::spawn(move || {
                    let point = if i % 2 == 0 {
                        GeoPoint::new(0.5, 0.5)
                    } else {
                        GeoPoint::new(5.0, 5.0)
                    };
                    record_driver_location(&state, driver.id, point).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Serialized updates alternate strictly between enter and exit.
        let log = events_for_driver(&state, driver.id);
        for pair in log.windows(2) {
            assert_ne!(pair[0].event_type, pair[1].event_type);
        }
        assert_eq!(log.first().map(|e| e.event_type), Some(GeofenceEventType::Enter));
    }
}
