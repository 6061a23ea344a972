//! Driver selection and the order/driver claim.
//!
//! Lock order: order entry, then driver entry, then assignment records.
//! Nothing in the crate holds a driver entry or an assignment record while
//! acquiring an order entry.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::scoring::{compute_score, rank, ScoredCandidate};
use crate::engine::serviceability::serving_zone;
use crate::error::AppError;
use crate::models::assignment::{
    Assignment, AssignmentStatus, BatchItem, BatchOutcome, BatchReport, DriverMatch, Reassignment,
};
use crate::models::driver::{Driver, DriverStatus, VehicleType};
use crate::models::event::DispatchEvent;
use crate::models::order::{AllocationState, Order, OrderStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchOptions {
    #[serde(default)]
    pub max_distance_km: Option<f64>,
    #[serde(default)]
    pub vehicle_types: Option<Vec<VehicleType>>,
    #[serde(default)]
    pub exclude_drivers: Vec<Uuid>,
    #[serde(default)]
    pub min_rating: Option<f64>,
}

pub fn get_order(state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
    state
        .orders
        .get(&order_id)
        .map(|order| order.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
}

/// Ranks every driver that passes the hard filters and returns the best one.
/// A driver failing any filter is never returned, whatever its score.
pub fn find_best_driver(
    state: &AppState,
    order: &Order,
    options: &MatchOptions,
) -> Result<DriverMatch, AppError> {
    let config = &state.config.allocation;
    let max_distance_km = options.max_distance_km.unwrap_or(config.max_distance_km);
    let min_rating = options.min_rating.unwrap_or(config.min_rating);
    let excluded: HashSet<Uuid> = options.exclude_drivers.iter().copied().collect();

    let best = state
        .drivers
        .iter()
        .filter_map(|entry| {
            let driver = entry.value();
            if excluded.contains(&driver.id) || !passes_filters(driver, options, min_rating, config.max_active_orders) {
                return None;
            }

            let location = driver.location?;
            let (score, breakdown) = compute_score(&location, driver, &order.pickup, config);
            if breakdown.distance_km > max_distance_km {
                return None;
            }

            Some(ScoredCandidate {
                driver_id: driver.id,
                score,
                breakdown,
                last_location_update: driver.last_location_update,
            })
        })
        .min_by(rank)
        .ok_or(AppError::NoEligibleDriver(order.id))?;

    let pickup_eta_minutes = if config.average_speed_kmh > 0.0 {
        best.breakdown.distance_km / config.average_speed_kmh * 60.0
    } else {
        0.0
    };

    Ok(DriverMatch {
        driver_id: best.driver_id,
        score: best.score,
        score_breakdown: best.breakdown,
        pickup_eta_minutes,
    })
}

fn passes_filters(driver: &Driver, options: &MatchOptions, min_rating: f64, max_active_orders: u32) -> bool {
    driver.can_take_order(max_active_orders)
        && driver.average_rating >= min_rating
        && options
            .vehicle_types
            .as_ref()
            .is_none_or(|types| types.is_empty() || types.contains(&driver.vehicle_type))
}

pub fn auto_assign_order(state: &AppState, order_id: Uuid) -> Result<Assignment, AppError> {
    let start = Instant::now();
    let result = assign_excluding(state, order_id, &[]);

    let outcome = match &result {
        Ok(_) => "assigned",
        Err(AppError::NoEligibleDriver(_)) => "no_driver",
        Err(AppError::AssignmentConflict(_)) | Err(AppError::Conflict(_)) => "conflict",
        Err(_) => "error",
    };
    state
        .metrics
        .assignment_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());

    result
}

/// Search-and-claim for one order. A lost driver claim is retried once
/// against the remaining pool.
fn assign_excluding(
    state: &AppState,
    order_id: Uuid,
    exclude: &[Uuid],
) -> Result<Assignment, AppError> {
    let now = Utc::now();
    let order = begin_search(state, order_id, now)?;

    let mut options = options_for(state, &order);
    options.exclude_drivers.extend_from_slice(exclude);

    let mut retried = false;
    loop {
        let candidate = match find_best_driver(state, &order, &options) {
            Ok(candidate) => candidate,
            Err(err) => {
                end_search(state, order_id, now);
                record_outcome(state, &err);
                if let AppError::NoEligibleDriver(_) = err {
                    warn!(order_id = %order_id, "no eligible driver");
                    state.publish(DispatchEvent::OrderUnassignable {
                        order_id,
                        reason: "no eligible driver".to_string(),
                    });
                }
                return Err(err);
            }
        };

        #[cfg(test)]
        tests::before_claim(state, &candidate);

        match claim(state, order_id, &candidate, now) {
            Ok(assignment) => {
                state
                    .metrics
                    .assignments_total
                    .with_label_values(&["assigned"])
                    .inc();
                info!(
                    order_id = %order_id,
                    driver_id = %assignment.driver_id,
                    score = assignment.score,
                    "order assigned"
                );
                state.publish(DispatchEvent::DriverAssigned(assignment.clone()));
                return Ok(assignment);
            }
            Err(AppError::AssignmentConflict(reason)) if !retried => {
                warn!(
                    order_id = %order_id,
                    driver_id = %candidate.driver_id,
                    reason = %reason,
                    "driver claim lost; retrying with remaining pool"
                );
                retried = true;
                options.exclude_drivers.push(candidate.driver_id);
            }
            Err(err) => {
                end_search(state, order_id, now);
                record_outcome(state, &err);
                return Err(err);
            }
        }
    }
}

fn record_outcome(state: &AppState, err: &AppError) {
    let outcome = match err {
        AppError::NoEligibleDriver(_) => "no_driver",
        AppError::AssignmentConflict(_) | AppError::Conflict(_) => "conflict",
        _ => "error",
    };
    state
        .metrics
        .assignments_total
        .with_label_values(&[outcome])
        .inc();
}

/// Defaults from config; the zone serving the order narrows vehicle types.
fn options_for(state: &AppState, order: &Order) -> MatchOptions {
    let zone = order
        .zone_id
        .and_then(|id| state.zones.get(&id).map(|zone| zone.value().clone()))
        .or_else(|| serving_zone(state, &order.dropoff, order.merchant_id));

    let vehicle_types = zone
        .map(|zone| zone.properties.allowed_vehicle_types)
        .filter(|types| !types.is_empty());

    MatchOptions {
        vehicle_types,
        ..MatchOptions::default()
    }
}

fn begin_search(state: &AppState, order_id: Uuid, now: DateTime<Utc>) -> Result<Order, AppError> {
    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if !order.is_claimable() {
        return Err(AppError::Conflict(format!(
            "order {order_id} is not awaiting assignment"
        )));
    }

    if order.allocation == AllocationState::Unassigned {
        order.transition(AllocationState::Searching, None, now);
    }

    Ok(order.clone())
}

fn end_search(state: &AppState, order_id: Uuid, now: DateTime<Utc>) {
    if let Some(mut order) = state.orders.get_mut(&order_id) {
        if order.allocation == AllocationState::Searching && order.driver_id.is_none() {
            order.transition(AllocationState::Unassigned, None, now);
        }
    }
}

/// Conditional update: succeeds only while the order is unassigned and the
/// driver is still eligible; both entries are held for the whole check and
/// write. Losing the order yields `Conflict`, losing the driver yields
/// `AssignmentConflict`.
fn claim(
    state: &AppState,
    order_id: Uuid,
    candidate: &DriverMatch,
    now: DateTime<Utc>,
) -> Result<Assignment, AppError> {
    let max_active_orders = state.config.allocation.max_active_orders;

    let assignment = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        if !order.is_claimable() {
            return Err(AppError::Conflict(format!(
                "order {order_id} was assigned concurrently"
            )));
        }

        let mut driver = state.drivers.get_mut(&candidate.driver_id).ok_or_else(|| {
            AppError::AssignmentConflict(format!("driver {} disappeared", candidate.driver_id))
        })?;
        if !driver.can_take_order(max_active_orders) {
            return Err(AppError::AssignmentConflict(format!(
                "driver {} is no longer available",
                candidate.driver_id
            )));
        }

        driver.active_orders += 1;
        if driver.active_orders >= max_active_orders {
            driver.status = DriverStatus::Busy;
        }
        driver.updated_at = now;
        record_driver_load(state, &driver, max_active_orders);

        order.driver_id = Some(driver.id);
        order.status = OrderStatus::DriverAssigned;
        order.transition(AllocationState::Assigned, None, now);

        let assignment = Assignment {
            id: Uuid::new_v4(),
            order_id,
            driver_id: driver.id,
            score: candidate.score,
            score_breakdown: candidate.score_breakdown.clone(),
            status: AssignmentStatus::Active,
            assigned_at: now,
            closed_at: None,
        };
        // Recorded before the order entry is released so a concurrent
        // release always finds the active record to close.
        state.assignments.insert(assignment.id, assignment.clone());
        assignment
    };

    Ok(assignment)
}

fn record_driver_load(state: &AppState, driver: &Driver, max_active_orders: u32) {
    let load = if max_active_orders == 0 {
        1.0
    } else {
        f64::from(driver.active_orders) / f64::from(max_active_orders)
    };
    state
        .metrics
        .driver_load
        .with_label_values(&[&driver.id.to_string()])
        .set(load);
}

/// Oldest orders first. Each driver claimed in this run is excluded from
/// every later order of the same run. Unknown ids reject the whole batch
/// before anything is assigned.
pub fn batch_allocate(state: &AppState, order_ids: &[Uuid]) -> Result<BatchReport, AppError> {
    let mut seen = HashSet::new();
    let mut orders = Vec::with_capacity(order_ids.len());
    for id in order_ids {
        if seen.insert(*id) {
            orders.push(get_order(state, *id)?);
        }
    }
    orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut claimed: Vec<Uuid> = Vec::new();
    let mut items = Vec::with_capacity(orders.len());

    for order in orders {
        let outcome = match assign_excluding(state, order.id, &claimed) {
            Ok(assignment) => {
                claimed.push(assignment.driver_id);
                BatchOutcome::Assigned {
                    driver_id: assignment.driver_id,
                    score: assignment.score,
                }
            }
            Err(AppError::NoEligibleDriver(_)) => BatchOutcome::NoEligibleDriver,
            Err(AppError::AssignmentConflict(message)) => BatchOutcome::Conflict { message },
            Err(err) => BatchOutcome::Skipped {
                reason: err.to_string(),
            },
        };
        items.push(BatchItem {
            order_id: order.id,
            outcome,
        });
    }

    let assigned = items
        .iter()
        .filter(|item| matches!(item.outcome, BatchOutcome::Assigned { .. }))
        .count();
    info!(orders = items.len(), assigned, "batch allocation finished");

    Ok(BatchReport {
        assigned,
        unassigned: items.len() - assigned,
        items,
    })
}

/// Releases the current driver, records why, and searches again without
/// that driver. Only the release can fail the call; an order the search
/// leaves without a driver stays `Unassigned` and `assignment` is `None`.
pub fn reassign_order(
    state: &AppState,
    order_id: Uuid,
    reason: &str,
) -> Result<Reassignment, AppError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation(
            "a reassignment reason is required".to_string(),
        ));
    }

    let now = Utc::now();
    let previous_driver_id = release(state, order_id, reason, now)?;

    if let Some(previous) = previous_driver_id {
        info!(order_id = %order_id, driver_id = %previous, reason, "driver released");
        state.publish(DispatchEvent::DriverReassigned {
            order_id,
            previous_driver_id: previous,
            reason: reason.to_string(),
        });
    }

    // The release above is committed; a failed search only means no new
    // driver, never a failed reassignment.
    let exclude: Vec<Uuid> = previous_driver_id.into_iter().collect();
    let assignment = match assign_excluding(state, order_id, &exclude) {
        Ok(assignment) => Some(assignment),
        Err(AppError::NoEligibleDriver(_)) => None,
        Err(err) => {
            warn!(order_id = %order_id, error = %err, "replacement search failed after release");
            None
        }
    };

    Ok(Reassignment {
        order_id,
        previous_driver_id,
        assignment,
    })
}

fn release(
    state: &AppState,
    order_id: Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Option<Uuid>, AppError> {
    let max_active_orders = state.config.allocation.max_active_orders;

    let previous = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if order.allocation == AllocationState::Delivered
            || matches!(order.status, OrderStatus::Delivered | OrderStatus::Cancelled)
        {
            return Err(AppError::Conflict(format!(
                "order {order_id} is already closed"
            )));
        }

        let previous = order.driver_id;
        if let Some(driver_id) = previous {
            if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
                free_capacity(&mut driver, max_active_orders, now);
                record_driver_load(state, &driver, max_active_orders);
            }
            close_active_assignment(
                state,
                order_id,
                AssignmentStatus::Released {
                    reason: reason.to_string(),
                },
                now,
            );
            order.transition(AllocationState::Released, Some(reason.to_string()), now);
            order.driver_id = None;
            order.status = OrderStatus::ReadyForPickup;
        }
        if order.allocation != AllocationState::Unassigned {
            order.transition(AllocationState::Unassigned, None, now);
        }
        previous
    };

    Ok(previous)
}

/// Delivered handoff: ends the active assignment and frees the driver.
pub fn complete_delivery(state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
    let now = Utc::now();
    let max_active_orders = state.config.allocation.max_active_orders;

    let order = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        let Some(driver_id) = order.driver_id else {
            return Err(AppError::Conflict(format!(
                "order {order_id} has no assigned driver"
            )));
        };
        if order.allocation != AllocationState::Assigned {
            return Err(AppError::Conflict(format!(
                "order {order_id} is not in an assigned state"
            )));
        }

        if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
            free_capacity(&mut driver, max_active_orders, now);
            record_driver_load(state, &driver, max_active_orders);
        }

        close_active_assignment(state, order_id, AssignmentStatus::Completed, now);
        order.status = OrderStatus::Delivered;
        order.transition(AllocationState::Delivered, None, now);
        order.clone()
    };

    info!(order_id = %order_id, "delivery completed");

    Ok(order)
}

fn free_capacity(driver: &mut Driver, max_active_orders: u32, now: DateTime<Utc>) {
    driver.active_orders = driver.active_orders.saturating_sub(1);
    if driver.status == DriverStatus::Busy && driver.active_orders < max_active_orders {
        driver.status = DriverStatus::Online;
    }
    driver.updated_at = now;
}

/// Called with the order entry held, so the record set always agrees with
/// the order's `driver_id`.
fn close_active_assignment(
    state: &AppState,
    order_id: Uuid,
    status: AssignmentStatus,
    now: DateTime<Utc>,
) {
    for mut entry in state.assignments.iter_mut() {
        let assignment = entry.value_mut();
        if assignment.order_id == order_id && assignment.status == AssignmentStatus::Active {
            assignment.status = status.clone();
            assignment.closed_at = Some(now);
        }
    }
}

pub fn assignments_for_order(state: &AppState, order_id: Uuid) -> Vec<Assignment> {
    let mut assignments: Vec<Assignment> = state
        .assignments
        .iter()
        .filter(|entry| entry.order_id == order_id)
        .map(|entry| entry.value().clone())
        .collect();
    assignments.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at));
    assignments
}
