use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::fleet::{self, DriverDraft};
use crate::engine::geofence::events_for_driver;
use crate::engine::location::{self, LocationUpdate};
use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus, GeoPoint, LocationSample};
use crate::models::event::GeofenceEvent;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/status", patch(update_driver_status))
        .route("/drivers/:id/location", post(update_driver_location))
        .route("/drivers/:id/locations", get(driver_locations))
        .route("/drivers/:id/geofence-events", get(driver_geofence_events))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DriverDraft>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    let driver = fleet::register_driver(&state, payload)?;
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    Json(fleet::list_drivers(&state))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(fleet::set_driver_status(&state, id, payload.status)?))
}

async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<LocationUpdate>, AppError> {
    Ok(Json(location::record_driver_location(
        &state,
        id,
        payload.location,
    )?))
}

async fn driver_locations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LocationSample>>, AppError> {
    ensure_driver(&state, id)?;
    Ok(Json(location::location_history(&state, id)))
}

async fn driver_geofence_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<GeofenceEvent>>, AppError> {
    ensure_driver(&state, id)?;
    Ok(Json(events_for_driver(&state, id)))
}

fn ensure_driver(state: &AppState, id: Uuid) -> Result<(), AppError> {
    if state.drivers.contains_key(&id) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("driver {id} not found")))
    }
}
