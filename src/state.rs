use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::driver::{Driver, GeoPoint, LocationSample};
use crate::models::event::{DispatchEvent, GeofenceEvent};
use crate::models::order::Order;
use crate::models::surge::{SurgeEvaluation, SurgeRule, WeatherObservation};
use crate::models::zone::Zone;
use crate::observability::metrics::Metrics;

/// Source of weather observations for weather-based surge rules.
pub trait WeatherFeed: Send + Sync {
    fn latest(&self, location: &GeoPoint) -> Result<WeatherObservation, AppError>;
}

/// Keeps the most recently recorded observation; reports it as unavailable
/// when missing or older than `max_age`.
pub struct RecordedWeather {
    latest: RwLock<Option<WeatherObservation>>,
    max_age: Duration,
}

impl RecordedWeather {
    pub fn new(max_age_minutes: u32) -> Self {
        Self {
            latest: RwLock::new(None),
            max_age: Duration::minutes(i64::from(max_age_minutes)),
        }
    }

    pub fn record(&self, observation: WeatherObservation) -> Result<(), AppError> {
        let mut latest = self
            .latest
            .write()
            .map_err(|_| AppError::Internal("weather lock poisoned".to_string()))?;
        *latest = Some(observation);
        Ok(())
    }

    fn latest_at(&self, now: DateTime<Utc>) -> Result<WeatherObservation, AppError> {
        let latest = self
            .latest
            .read()
            .map_err(|_| AppError::Internal("weather lock poisoned".to_string()))?;
        let observation = latest.clone().ok_or_else(|| {
            AppError::DependencyUnavailable("no weather observation recorded".to_string())
        })?;

        if now - observation.observed_at > self.max_age {
            return Err(AppError::DependencyUnavailable(format!(
                "weather observation from {} is stale",
                observation.observed_at
            )));
        }

        Ok(observation)
    }
}

impl WeatherFeed for RecordedWeather {
    fn latest(&self, _location: &GeoPoint) -> Result<WeatherObservation, AppError> {
        self.latest_at(Utc::now())
    }
}

pub struct AppState {
    pub config: DispatchConfig,
    pub zones: DashMap<Uuid, Zone>,
    pub surge_rules: DashMap<Uuid, SurgeRule>,
    pub surge_cache: DashMap<Uuid, SurgeEvaluation>,
    pub drivers: DashMap<Uuid, Driver>,
    pub orders: DashMap<Uuid, Order>,
    pub assignments: DashMap<Uuid, Assignment>,
    pub geofence_events: DashMap<Uuid, Vec<GeofenceEvent>>,
    pub location_history: DashMap<Uuid, Vec<LocationSample>>,
    pub recorded_weather: Arc<RecordedWeather>,
    pub weather: Arc<dyn WeatherFeed>,
    pub order_tx: mpsc::Sender<Uuid>,
    pub events_tx: broadcast::Sender<DispatchEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: DispatchConfig,
        order_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        let recorded_weather = Arc::new(RecordedWeather::new(config.surge.weather_max_age_minutes));
        let weather: Arc<dyn WeatherFeed> = recorded_weather.clone();
        Self::build(config, weather, recorded_weather, order_queue_size, event_buffer_size)
    }

    /// Same as [`AppState::new`] but weather rules read from `weather`
    /// instead of the observations recorded through the API.
    pub fn with_weather(
        config: DispatchConfig,
        weather: Arc<dyn WeatherFeed>,
        order_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        let recorded_weather = Arc::new(RecordedWeather::new(config.surge.weather_max_age_minutes));
        Self::build(config, weather, recorded_weather, order_queue_size, event_buffer_size)
    }

    fn build(
        config: DispatchConfig,
        weather: Arc<dyn WeatherFeed>,
        recorded_weather: Arc<RecordedWeather>,
        order_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        let (order_tx, order_rx) = mpsc::channel(order_queue_size);
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        (
            Self {
                config,
                zones: DashMap::new(),
                surge_rules: DashMap::new(),
                surge_cache: DashMap::new(),
                drivers: DashMap::new(),
                orders: DashMap::new(),
                assignments: DashMap::new(),
                geofence_events: DashMap::new(),
                location_history: DashMap::new(),
                recorded_weather,
                weather,
                order_tx,
                events_tx,
                metrics: Metrics::new(),
            },
            order_rx,
        )
    }

    /// Fire-and-forget: nobody listening is not an error.
    pub fn publish(&self, event: DispatchEvent) {
        let _ = self.events_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_weather_is_unavailable() {
        let weather = RecordedWeather::new(60);
        let err = weather.latest_at(Utc::now()).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn stale_weather_is_unavailable() {
        let weather = RecordedWeather::new(60);
        let now = Utc::now();
        weather
            .record(WeatherObservation {
                condition: "rain".to_string(),
                temperature_c: Some(18.0),
                observed_at: now - Duration::minutes(90),
            })
            .unwrap();

        assert!(matches!(
            weather.latest_at(now),
            Err(AppError::DependencyUnavailable(_))
        ));
        assert!(weather.latest_at(now - Duration::minutes(40)).is_ok());
    }
}
