use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::engine::allocation::{self, MatchOptions};
use crate::engine::orders::{self, OrderDraft};
use crate::engine::queue::enqueue_order;
use crate::error::AppError;
use crate::models::assignment::{Assignment, BatchReport, DriverMatch, Reassignment};
use crate::models::order::Order;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/batch-allocate", post(batch_allocate))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/best-driver", post(best_driver))
        .route("/orders/:id/auto-assign", post(auto_assign))
        .route("/orders/:id/reassign", post(reassign))
        .route("/orders/:id/complete", post(complete))
        .route("/orders/:id/assignments", get(order_assignments))
        .route("/assignments", get(list_assignments))
}

#[derive(Deserialize)]
pub struct ReassignRequest {
    pub reason: String,
}

#[derive(Deserialize)]
pub struct BatchRequest {
    pub order_ids: Vec<Uuid>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OrderDraft>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = orders::create_order(&state, payload)?;

    if state.config.allocation.auto_dispatch {
        // The order is stored either way; it can still be assigned by hand.
        if let Err(err) = enqueue_order(&state, order.id).await {
            warn!(order_id = %order.id, error = %err, "failed to queue order for dispatch");
        }
    }

    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(allocation::get_order(&state, id)?))
}

/// Body is optional; missing fields fall back to the configured limits.
async fn best_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<MatchOptions>>,
) -> Result<Json<DriverMatch>, AppError> {
    let options = payload.map(|Json(options)| options).unwrap_or_default();
    let order = allocation::get_order(&state, id)?;
    Ok(Json(allocation::find_best_driver(&state, &order, &options)?))
}

async fn auto_assign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Assignment>, AppError> {
    Ok(Json(allocation::auto_assign_order(&state, id)?))
}

async fn reassign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReassignRequest>,
) -> Result<Json<Reassignment>, AppError> {
    Ok(Json(allocation::reassign_order(&state, id, &payload.reason)?))
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(allocation::complete_delivery(&state, id)?))
}

async fn batch_allocate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchRequest>,
) -> Result<Json<BatchReport>, AppError> {
    Ok(Json(allocation::batch_allocate(&state, &payload.order_ids)?))
}

async fn order_assignments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Assignment>>, AppError> {
    allocation::get_order(&state, id)?;
    Ok(Json(allocation::assignments_for_order(&state, id)))
}

async fn list_assignments(State(state): State<Arc<AppState>>) -> Json<Vec<Assignment>> {
    let mut assignments: Vec<Assignment> = state
        .assignments
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    assignments.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at));

    Json(assignments)
}
