use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::geo::polygon::is_in_zone;
use crate::models::driver::GeoPoint;
use crate::models::event::{GeofenceEvent, GeofenceEventType};
use crate::models::zone::Zone;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct Transitions {
    pub current_zones: Vec<Uuid>,
    pub events: Vec<GeofenceEvent>,
}

/// Active zones whose polygon contains `point`.
pub fn zones_containing(state: &AppState, point: &GeoPoint) -> Vec<Zone> {
    state
        .zones
        .iter()
        .filter(|entry| entry.is_active && is_in_zone(point, &entry.polygon))
        .map(|entry| entry.value().clone())
        .collect()
}

fn zone_ids_containing(state: &AppState, point: &GeoPoint) -> BTreeSet<Uuid> {
    state
        .zones
        .iter()
        .filter(|entry| entry.is_active && is_in_zone(point, &entry.polygon))
        .map(|entry| *entry.key())
        .collect()
}

/// Diffs zone membership between two consecutive reports and appends one
/// `exit` per zone left and one `enter` per zone entered to the driver's
/// event log before returning them. Exits come first; each group is ordered
/// by zone id.
///
/// Callers must serialize calls per driver.
pub fn detect_transitions(
    state: &AppState,
    driver_id: Uuid,
    previous: Option<&GeoPoint>,
    current: &GeoPoint,
    now: DateTime<Utc>,
) -> Transitions {
    let before = previous
        .map(|point| zone_ids_containing(state, point))
        .unwrap_or_default();
    let after = zone_ids_containing(state, current);

    let exits = before
        .difference(&after)
        .map(|zone_id| (*zone_id, GeofenceEventType::Exit));
    let enters = after
        .difference(&before)
        .map(|zone_id| (*zone_id, GeofenceEventType::Enter));

    let events: Vec<GeofenceEvent> = exits
        .chain(enters)
        .map(|(zone_id, event_type)| GeofenceEvent {
            id: Uuid::new_v4(),
            driver_id,
            zone_id,
            event_type,
            location: *current,
            timestamp: now,
        })
        .collect();

    if !events.is_empty() {
        state
            .geofence_events
            .entry(driver_id)
            .or_default()
            .extend(events.iter().cloned());

        for event in &events {
            state
                .metrics
                .geofence_events_total
                .with_label_values(&[event.event_type.as_str()])
                .inc();
        }
    }

    Transitions {
        current_zones: after.into_iter().collect(),
        events,
    }
}

pub fn events_for_driver(state: &AppState, driver_id: Uuid) -> Vec<GeofenceEvent> {
    state
        .geofence_events
        .get(&driver_id)
        .map(|log| log.value().clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_zone, square, test_state};

    #[test]
    fn first_report_enters_every_containing_zone() {
        let state = test_state();
        let outer = add_zone(&state, square(0.0, 0.0, 2.0), 0);
        let inner = add_zone(&state, square(0.5, 0.5, 0.5), 1);
        add_zone(&state, square(10.0, 10.0, 1.0), 0);

        let driver = Uuid::new_v4();
        let result = detect_transitions(&state, driver, None, &GeoPoint::new(0.75, 0.75), Utc::now());

        let mut entered: Vec<Uuid> = result.events.iter().map(|e| e.zone_id).collect();
        entered.sort();
        let mut expected = vec![outer.id, inner.id];
        expected.sort();
        assert_eq!(entered, expected);
        assert!(result.events.iter().all(|e| e.event_type == GeofenceEventType::Enter));
        assert_eq!(events_for_driver(&state, driver).len(), 2);
    }

    #[test]
    fn moving_between_zones_emits_exit_then_enter() {
        let state = test_state();
        let west = add_zone(&state, square(0.0, 0.0, 1.0), 0);
        let east = add_zone(&state, square(0.0, 2.0, 1.0), 0);

        let driver = Uuid::new_v4();
        let result = detect_transitions(
            &state,
            driver,
            Some(&GeoPoint::new(0.5, 0.5)),
            &GeoPoint::new(0.5, 2.5),
            Utc::now(),
        );

        assert_eq!(result.events.len(), 2);
        assert_eq!(result.events[0].zone_id, west.id);
        assert_eq!(result.events[0].event_type, GeofenceEventType::Exit);
        assert_eq!(result.events[1].zone_id, east.id);
        assert_eq!(result.events[1].event_type, GeofenceEventType::Enter);
        assert_eq!(result.current_zones, vec![east.id]);
    }

    #[test]
    fn staying_inside_emits_nothing() {
        let state = test_state();
        add_zone(&state, square(0.0, 0.0, 1.0), 0);

        let driver = Uuid::new_v4();
        let result = detect_transitions(
            &state,
            driver,
            Some(&GeoPoint::new(0.2, 0.2)),
            &GeoPoint::new(0.8, 0.8),
            Utc::now(),
        );

        assert!(result.events.is_empty());
        assert_eq!(result.current_zones.len(), 1);
        assert!(events_for_driver(&state, driver).is_empty());
    }

    #[test]
    fn inactive_zones_are_ignored() {
        let state = test_state();
        let zone = add_zone(&state, square(0.0, 0.0, 1.0), 0);
        state.zones.get_mut(&zone.id).unwrap().is_active = false;

        let result = detect_transitions(&state, Uuid::new_v4(), None, &GeoPoint::new(0.5, 0.5), Utc::now());
        assert!(result.events.is_empty());
        assert!(zones_containing(&state, &GeoPoint::new(0.5, 0.5)).is_empty());
    }
}
