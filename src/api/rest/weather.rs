use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::models::surge::WeatherObservation;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/weather", post(record_weather))
}

#[derive(Deserialize)]
pub struct WeatherRequest {
    pub condition: String,
    #[serde(default)]
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

async fn record_weather(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WeatherRequest>,
) -> Result<(StatusCode, Json<WeatherObservation>), AppError> {
    let condition = payload.condition.trim().to_lowercase();
    if condition.is_empty() {
        return Err(AppError::Validation("condition cannot be empty".to_string()));
    }

    let observation = WeatherObservation {
        condition,
        temperature_c: payload.temperature_c,
        observed_at: payload.observed_at.unwrap_or_else(Utc::now),
    };
    state.recorded_weather.record(observation.clone())?;

    // Weather rules may flip for every zone.
    state.surge_cache.clear();
    info!(condition = %observation.condition, "weather observation recorded");

    Ok((StatusCode::CREATED, Json(observation)))
}
