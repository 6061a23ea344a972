use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::engine::surge;
use crate::error::AppError;
use crate::geo::polygon::{area_km2, centroid, normalize_polygon};
use crate::models::zone::{Zone, ZoneDraft, ZoneFilter, ZonePatch, ZoneProperties, ZoneStatistics};
use crate::state::AppState;

pub fn create_zone(state: &AppState, draft: ZoneDraft) -> Result<Zone, AppError> {
    validate_name(&draft.name)?;
    validate_properties(&draft.properties)?;
    let polygon = normalize_polygon(&draft.polygon)?;

    let now = Utc::now();
    let zone = Zone {
        id: Uuid::new_v4(),
        name: draft.name.trim().to_string(),
        zone_type: draft.zone_type,
        polygon,
        properties: draft.properties,
        is_active: draft.is_active,
        merchant_id: draft.merchant_id,
        created_at: now,
        updated_at: now,
    };

    state.zones.insert(zone.id, zone.clone());
    info!(zone_id = %zone.id, name = %zone.name, zone_type = ?zone.zone_type, "zone created");

    Ok(zone)
}

pub fn get_zone(state: &AppState, id: Uuid) -> Result<Zone, AppError> {
    state
        .zones
        .get(&id)
        .map(|zone| zone.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("zone {id} not found")))
}

/// Applies a partial update. Everything is validated before the stored zone
/// is touched.
pub fn update_zone(state: &AppState, id: Uuid, patch: ZonePatch) -> Result<Zone, AppError> {
    if let Some(name) = &patch.name {
        validate_name(name)?;
    }
    if let Some(properties) = &patch.properties {
        validate_properties(properties)?;
    }
    let polygon = patch
        .polygon
        .as_deref()
        .map(normalize_polygon)
        .transpose()?;

    let updated = {
        let mut zone = state
            .zones
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("zone {id} not found")))?;

        if let Some(name) = patch.name {
            zone.name = name.trim().to_string();
        }
        if let Some(zone_type) = patch.zone_type {
            zone.zone_type = zone_type;
        }
        if let Some(polygon) = polygon {
            zone.polygon = polygon;
        }
        if let Some(properties) = patch.properties {
            zone.properties = properties;
        }
        if let Some(is_active) = patch.is_active {
            zone.is_active = is_active;
        }
        if let Some(merchant_id) = patch.merchant_id {
            zone.merchant_id = Some(merchant_id);
        }
        zone.updated_at = Utc::now();
        zone.clone()
    };

    surge::invalidate(state, id);
    info!(zone_id = %id, "zone updated");

    Ok(updated)
}

/// Removes the zone together with its surge rules.
pub fn delete_zone(state: &AppState, id: Uuid) -> Result<Zone, AppError> {
    let (_, zone) = state
        .zones
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("zone {id} not found")))?;

    state.surge_rules.retain(|_, rule| rule.zone_id != id);
    surge::invalidate(state, id);
    info!(zone_id = %id, "zone deleted");

    Ok(zone)
}

/// Highest priority first, then by name.
pub fn list_zones(state: &AppState, filter: &ZoneFilter) -> Vec<Zone> {
    let mut zones: Vec<Zone> = state
        .zones
        .iter()
        .filter(|entry| filter.matches(entry.value()))
        .map(|entry| entry.value().clone())
        .collect();

    zones.sort_by(|a, b| {
        b.properties
            .priority
            .cmp(&a.properties.priority)
            .then_with(|| a.name.cmp(&b.name))
    });
    zones
}

pub fn zone_statistics(state: &AppState, id: Uuid) -> Result<ZoneStatistics, AppError> {
    zone_statistics_at(state, id, Utc::now())
}

pub fn zone_statistics_at(
    state: &AppState,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<ZoneStatistics, AppError> {
    let zone = get_zone(state, id)?;
    let center = centroid(&zone.polygon);
    let window = surge::demand_window(state, None);

    let active_rules = state
        .surge_rules
        .iter()
        .filter(|entry| entry.zone_id == id && entry.is_active)
        .count();

    Ok(ZoneStatistics {
        zone_id: id,
        area_km2: area_km2(&zone.polygon),
        centroid: center,
        vertex_count: zone.polygon.len(),
        online_drivers: surge::online_drivers_in_zone(state, &zone, now),
        pending_orders: surge::pending_orders_in_zone(state, id),
        recent_orders: surge::recent_orders_in_zone(state, id, now - window),
        active_rules,
        surge_multiplier: surge::current_multiplier_at(state, id, now)?,
    })
}

fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("zone name cannot be empty".to_string()));
    }
    Ok(())
}

fn validate_properties(properties: &ZoneProperties) -> Result<(), AppError> {
    if !properties.base_delivery_fee.is_finite() || properties.base_delivery_fee < 0.0 {
        return Err(AppError::Validation(
            "base_delivery_fee must be a non-negative number".to_string(),
        ));
    }

    for (label, value) in [
        ("min_order_value", properties.min_order_value),
        ("max_order_value", properties.max_order_value),
    ] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(AppError::Validation(format!(
                    "{label} must be a non-negative number"
                )));
            }
        }
    }

    if let (Some(min), Some(max)) = (properties.min_order_value, properties.max_order_value) {
        if min > max {
            return Err(AppError::Validation(
                "min_order_value cannot exceed max_order_value".to_string(),
            ));
        }
    }

    if properties.max_concurrent_orders == Some(0) {
        return Err(AppError::Validation(
            "max_concurrent_orders must be > 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::driver::GeoPoint;
    use crate::models::zone::ZoneType;
    use crate::test_support::{properties, square, test_state};

    fn draft(name: &str, zone_type: ZoneType, priority: i32) -> ZoneDraft {
        let mut props = properties(30.0);
        props.priority = priority;
        ZoneDraft {
            name: name.to_string(),
            zone_type,
            polygon: square(0.0, 0.0, 1.0),
            properties: props,
            is_active: true,
            merchant_id: None,
        }
    }

    #[test]
    fn create_rejects_invalid_polygon_without_storing() {
        let state = test_state();
        let mut bad = draft("bad", ZoneType::Delivery, 0);
        bad.polygon.truncate(2);

        assert!(matches!(create_zone(&state, bad), Err(AppError::Validation(_))));
        assert!(state.zones.is_empty());
    }

    #[test]
    fn create_rejects_inverted_order_value_range() {
        let state = test_state();
        let mut bad = draft("bad", ZoneType::Delivery, 0);
        bad.properties.min_order_value = Some(500.0);
        bad.properties.max_order_value = Some(100.0);

        assert!(create_zone(&state, bad).is_err());
    }

    #[test]
    fn list_filters_and_orders_by_priority() {
        let state = test_state();
        create_zone(&state, draft("low", ZoneType::Delivery, 1)).unwrap();
        create_zone(&state, draft("high", ZoneType::Delivery, 9)).unwrap();
        create_zone(&state, draft("surge", ZoneType::Surge, 5)).unwrap();

        let delivery = list_zones(
            &state,
            &ZoneFilter {
                zone_type: Some(ZoneType::Delivery),
                ..ZoneFilter::default()
            },
        );
        let names: Vec<&str> = delivery.iter().map(|z| z.name.as_str()).collect();
        assert_eq!(names, vec!["high", "low"]);
        assert_eq!(list_zones(&state, &ZoneFilter::default()).len(), 3);
    }

    #[test]
    fn update_with_bad_polygon_leaves_zone_untouched() {
        let state = test_state();
        let zone = create_zone(&state, draft("z", ZoneType::Delivery, 0)).unwrap();

        let patch = ZonePatch {
            name: Some("renamed".to_string()),
            polygon: Some(vec![GeoPoint::new(0.0, 0.0)]),
            ..ZonePatch::default()
        };
        assert!(update_zone(&state, zone.id, patch).is_err());
        assert_eq!(get_zone(&state, zone.id).unwrap().name, "z");

        let patch = ZonePatch {
            is_active: Some(false),
            ..ZonePatch::default()
        };
        assert!(!update_zone(&state, zone.id, patch).unwrap().is_active);
    }

    #[test]
    fn delete_removes_rules() {
        let state = test_state();
        let zone = create_zone(&state, draft("z", ZoneType::Delivery, 0)).unwrap();
        crate::test_support::add_rule(
            &state,
            zone.id,
            crate::models::surge::SurgeCondition::Weather { conditions: vec![] },
            1.2,
        );

        delete_zone(&state, zone.id).unwrap();
        assert!(state.surge_rules.is_empty());
        assert!(matches!(get_zone(&state, zone.id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn statistics_report_shape_and_counts() {
        let state = test_state();
        let zone = create_zone(&state, draft("z", ZoneType::Delivery, 0)).unwrap();
        let stats = zone_statistics(&state, zone.id).unwrap();

        assert_eq!(stats.vertex_count, 4);
        assert!(stats.area_km2 > 12_000.0);
        assert!((stats.centroid.lat - 0.5).abs() < 1e-9);
        assert_eq!(stats.surge_multiplier, 1.0);
        assert_eq!(stats.pending_orders, 0);
    }
}
