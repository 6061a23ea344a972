use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Timelike, Utc, Weekday};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::zones::get_zone;
use crate::error::AppError;
use crate::geo::polygon::{centroid, is_in_zone};
use crate::models::driver::{DriverStatus, GeoPoint};
use crate::models::surge::{SurgeCondition, SurgeEvaluation, SurgeRule, SurgeRuleDraft};
use crate::models::zone::Zone;
use crate::state::AppState;

const NO_SURGE: f64 = 1.0;

pub fn create_rule(
    state: &AppState,
    zone_id: Uuid,
    draft: SurgeRuleDraft,
) -> Result<SurgeRule, AppError> {
    get_zone(state, zone_id)?;
    validate_rule(&draft)?;

    let rule = SurgeRule {
        id: Uuid::new_v4(),
        zone_id,
        name: draft.name.trim().to_string(),
        condition: draft.condition,
        multiplier: draft.multiplier,
        priority: draft.priority,
        is_active: draft.is_active,
        created_at: Utc::now(),
    };

    state.surge_rules.insert(rule.id, rule.clone());
    invalidate(state, zone_id);
    info!(
        rule_id = %rule.id,
        zone_id = %zone_id,
        condition = rule.condition.kind(),
        multiplier = rule.multiplier,
        "surge rule created"
    );

    Ok(rule)
}

/// Rules of a zone, highest priority first.
pub fn list_rules(state: &AppState, zone_id: Uuid) -> Result<Vec<SurgeRule>, AppError> {
    get_zone(state, zone_id)?;
    let mut rules: Vec<SurgeRule> = state
        .surge_rules
        .iter()
        .filter(|entry| entry.zone_id == zone_id)
        .map(|entry| entry.value().clone())
        .collect();
    rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
    Ok(rules)
}

pub fn effective_multiplier(
    state: &AppState,
    zone_id: Uuid,
    location: &GeoPoint,
) -> Result<f64, AppError> {
    Ok(evaluate_at(state, zone_id, location, Utc::now())?.multiplier)
}

/// Evaluates every active rule of the zone and keeps the largest multiplier
/// among the satisfied ones. Multipliers never stack. A rule whose signal is
/// unavailable counts as not satisfied.
pub fn evaluate_at(
    state: &AppState,
    zone_id: Uuid,
    location: &GeoPoint,
    now: DateTime<Utc>,
) -> Result<SurgeEvaluation, AppError> {
    let zone = get_zone(state, zone_id)?;
    let rules: Vec<SurgeRule> = list_rules(state, zone_id)?
        .into_iter()
        .filter(|rule| rule.is_active)
        .collect();

    let mut multiplier = NO_SURGE;
    let mut satisfied_rules = Vec::new();

    for rule in &rules {
        match condition_satisfied(state, &zone, &rule.condition, location, now) {
            Ok(true) => {
                debug!(rule_id = %rule.id, multiplier = rule.multiplier, "surge rule satisfied");
                satisfied_rules.push(rule.id);
                multiplier = multiplier.max(rule.multiplier);
            }
            Ok(false) => {}
            Err(err) => {
                warn!(
                    rule_id = %rule.id,
                    zone_id = %zone_id,
                    error = %err,
                    "surge rule evaluation failed; treating as not satisfied"
                );
                state
                    .metrics
                    .surge_rule_failures_total
                    .with_label_values(&[rule.condition.kind()])
                    .inc();
            }
        }
    }

    Ok(SurgeEvaluation {
        zone_id,
        multiplier,
        satisfied_rules,
        evaluated_at: now,
    })
}

/// Zone-level multiplier, reused while younger than the cache TTL.
/// Location-dependent signals are read at the zone centroid, so the cached
/// value never depends on which caller computed it.
pub fn current_multiplier_at(
    state: &AppState,
    zone_id: Uuid,
    now: DateTime<Utc>,
) -> Result<f64, AppError> {
    let ttl = cache_ttl(state.config.surge.cache_ttl_secs);

    if let Some(cached) = state.surge_cache.get(&zone_id) {
        let age = now - cached.evaluated_at;
        if age >= Duration::zero() && age < ttl {
            return Ok(cached.multiplier);
        }
    }

    let zone = get_zone(state, zone_id)?;
    let evaluation = evaluate_at(state, zone_id, &centroid(&zone.polygon), now)?;
    let multiplier = evaluation.multiplier;
    state.surge_cache.insert(zone_id, evaluation);
    Ok(multiplier)
}

fn cache_ttl(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

pub fn invalidate(state: &AppState, zone_id: Uuid) {
    state.surge_cache.remove(&zone_id);
}

fn condition_satisfied(
    state: &AppState,
    zone: &Zone,
    condition: &SurgeCondition,
    location: &GeoPoint,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    match condition {
        SurgeCondition::TimeWindow {
            start_hour,
            end_hour,
            days,
        } => {
            let local = local_time(state, now);
            Ok(time_window_satisfied(
                *start_hour,
                *end_hour,
                days.as_deref(),
                &local,
            ))
        }
        SurgeCondition::DemandThreshold {
            min_orders,
            window_minutes,
        } => {
            let since = now - demand_window(state, *window_minutes);
            let recent = recent_orders_in_zone(state, zone.id, since);
            Ok(recent >= *min_orders as usize)
        }
        SurgeCondition::Weather { conditions } => {
            let observation = state.weather.latest(location)?;
            let observed = observation.condition.trim().to_ascii_lowercase();
            let bad = if conditions.is_empty() {
                &state.config.surge.bad_weather_conditions
            } else {
                conditions
            };
            Ok(bad.iter().any(|c| c.eq_ignore_ascii_case(&observed)))
        }
        SurgeCondition::DriverShortage {
            min_drivers,
            max_orders_per_driver,
        } => {
            let online = online_drivers_in_zone(state, zone, now);
            let pending = pending_orders_in_zone(state, zone.id);
            Ok(shortage(online, pending, *min_drivers, *max_orders_per_driver))
        }
        SurgeCondition::ScheduledEvent {
            starts_at, ends_at, ..
        } => Ok(now >= *starts_at && now < *ends_at),
    }
}

pub(crate) fn local_time(state: &AppState, now: DateTime<Utc>) -> NaiveDateTime {
    (now + Duration::minutes(i64::from(state.config.surge.utc_offset_minutes))).naive_utc()
}

/// `start == end` covers the whole day.
fn time_window_satisfied(
    start_hour: u8,
    end_hour: u8,
    days: Option<&[Weekday]>,
    local: &NaiveDateTime,
) -> bool {
    if let Some(days) = days {
        if !days.is_empty() && !days.contains(&local.weekday()) {
            return false;
        }
    }

    let hour = local.hour();
    let (start, end) = (u32::from(start_hour), u32::from(end_hour));
    if start == end {
        true
    } else if start < end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

fn shortage(online: usize, pending: usize, min_drivers: u32, max_orders_per_driver: u32) -> bool {
    online < min_drivers as usize || pending > online * max_orders_per_driver as usize
}

pub(crate) fn demand_window(state: &AppState, window_minutes: Option<u32>) -> Duration {
    let minutes = window_minutes.unwrap_or(state.config.surge.demand_window_minutes);
    Duration::minutes(i64::from(minutes))
}

pub fn recent_orders_in_zone(state: &AppState, zone_id: Uuid, since: DateTime<Utc>) -> usize {
    state
        .orders
        .iter()
        .filter(|entry| entry.zone_id == Some(zone_id) && entry.created_at >= since)
        .count()
}

pub fn pending_orders_in_zone(state: &AppState, zone_id: Uuid) -> usize {
    state
        .orders
        .iter()
        .filter(|entry| entry.zone_id == Some(zone_id) && entry.is_pending())
        .count()
}

/// Online drivers inside the zone that reported within the inactivity window.
pub fn online_drivers_in_zone(state: &AppState, zone: &Zone, now: DateTime<Utc>) -> usize {
    let cutoff =
        now - Duration::minutes(i64::from(state.config.surge.driver_inactivity_minutes));

    state
        .drivers
        .iter()
        .filter(|entry| {
            let driver = entry.value();
            driver.status == DriverStatus::Online
                && driver.is_active
                && driver.last_location_update.is_some_and(|at| at >= cutoff)
                && driver
                    .location
                    .is_some_and(|point| is_in_zone(&point, &zone.polygon))
        })
        .count()
}

fn validate_rule(draft: &SurgeRuleDraft) -> Result<(), AppError> {
    if draft.name.trim().is_empty() {
        return Err(AppError::Validation("rule name cannot be empty".to_string()));
    }
    if !draft.multiplier.is_finite() || draft.multiplier < 1.0 {
        return Err(AppError::Validation(
            "multiplier must be a number >= 1.0".to_string(),
        ));
    }

    match &draft.condition {
        SurgeCondition::TimeWindow {
            start_hour,
            end_hour,
            ..
        } => {
            if *start_hour > 23 || *end_hour > 23 {
                return Err(AppError::Validation(
                    "hours must be within 0..=23".to_string(),
                ));
            }
        }
        SurgeCondition::DemandThreshold {
            min_orders,
            window_minutes,
        } => {
            if *min_orders == 0 {
                return Err(AppError::Validation("min_orders must be > 0".to_string()));
            }
            if *window_minutes == Some(0) {
                return Err(AppError::Validation(
                    "window_minutes must be > 0".to_string(),
                ));
            }
        }
        SurgeCondition::Weather { conditions } => {
            if conditions.iter().any(|c| c.trim().is_empty()) {
                return Err(AppError::Validation(
                    "weather conditions cannot be blank".to_string(),
                ));
            }
        }
        SurgeCondition::DriverShortage { min_drivers, .. } => {
            if *min_drivers == 0 {
                return Err(AppError::Validation("min_drivers must be > 0".to_string()));
            }
        }
        SurgeCondition::ScheduledEvent {
            starts_at, ends_at, ..
        } => {
            if ends_at <= starts_at {
                return Err(AppError::Validation(
                    "scheduled event must end after it starts".to_string(),
                ));
            }
        }
    }

    Ok(())
}
