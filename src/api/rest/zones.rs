use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::serviceability::{check_serviceability, Serviceability, ServiceabilityQuery};
use crate::engine::{surge, zones};
use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::surge::{SurgeRule, SurgeRuleDraft};
use crate::models::zone::{Zone, ZoneDraft, ZoneFilter, ZonePatch, ZoneStatistics};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/zones", post(create_zone).get(list_zones))
        .route(
            "/zones/:id",
            get(get_zone).patch(update_zone).delete(delete_zone),
        )
        .route("/zones/:id/stats", get(zone_stats))
        .route(
            "/zones/:id/surge-rules",
            post(create_surge_rule).get(list_surge_rules),
        )
        .route("/zones/:id/surge", get(current_surge))
        .route("/serviceability", post(serviceability))
}

async fn create_zone(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ZoneDraft>,
) -> Result<(StatusCode, Json<Zone>), AppError> {
    let zone = zones::create_zone(&state, payload)?;
    Ok((StatusCode::CREATED, Json(zone)))
}

async fn list_zones(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ZoneFilter>,
) -> Json<Vec<Zone>> {
    Json(zones::list_zones(&state, &filter))
}

async fn get_zone(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Zone>, AppError> {
    Ok(Json(zones::get_zone(&state, id)?))
}

async fn update_zone(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ZonePatch>,
) -> Result<Json<Zone>, AppError> {
    Ok(Json(zones::update_zone(&state, id, payload)?))
}

async fn delete_zone(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    zones::delete_zone(&state, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn zone_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ZoneStatistics>, AppError> {
    Ok(Json(zones::zone_statistics(&state, id)?))
}

async fn create_surge_rule(
    State(state): State<Arc<AppState>>,
    Path(zone_id): Path<Uuid>,
    Json(payload): Json<SurgeRuleDraft>,
) -> Result<(StatusCode, Json<SurgeRule>), AppError> {
    let rule = surge::create_rule(&state, zone_id, payload)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn list_surge_rules(
    State(state): State<Arc<AppState>>,
    Path(zone_id): Path<Uuid>,
) -> Result<Json<Vec<SurgeRule>>, AppError> {
    Ok(Json(surge::list_rules(&state, zone_id)?))
}

#[derive(Deserialize)]
pub struct SurgeQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Serialize)]
struct SurgeResponse {
    zone_id: Uuid,
    multiplier: f64,
}

/// The cached zone-level multiplier, or a fresh evaluation at `lat`/`lng`
/// when a location is given.
async fn current_surge(
    State(state): State<Arc<AppState>>,
    Path(zone_id): Path<Uuid>,
    Query(query): Query<SurgeQuery>,
) -> Result<Json<SurgeResponse>, AppError> {
    let now = Utc::now();
    let multiplier = match (query.lat, query.lng) {
        (Some(lat), Some(lng)) => {
            let point = GeoPoint::new(lat, lng);
            if !point.is_valid() {
                return Err(AppError::Validation("invalid location".to_string()));
            }
            surge::evaluate_at(&state, zone_id, &point, now)?.multiplier
        }
        (None, None) => surge::current_multiplier_at(&state, zone_id, now)?,
        _ => {
            return Err(AppError::Validation(
                "lat and lng must be given together".to_string(),
            ))
        }
    };

    Ok(Json(SurgeResponse {
        zone_id,
        multiplier,
    }))
}

#[derive(Deserialize)]
pub struct ServiceabilityRequest {
    pub location: GeoPoint,
    #[serde(flatten)]
    pub query: ServiceabilityQuery,
}

async fn serviceability(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ServiceabilityRequest>,
) -> Result<Json<Serviceability>, AppError> {
    Ok(Json(check_serviceability(
        &state,
        &payload.location,
        &payload.query,
    )?))
}
