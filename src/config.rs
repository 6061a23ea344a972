use std::env;

use crate::error::AppError;

/// One day.
const MAX_SURGE_CACHE_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub order_queue_size: usize,
    pub event_buffer_size: usize,
    pub dispatch: DispatchConfig,
}

/// Engine tuning handed to `AppState` at construction.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    pub surge: SurgeConfig,
    pub allocation: AllocationConfig,
    pub location: LocationConfig,
}

#[derive(Debug, Clone)]
pub struct SurgeConfig {
    pub demand_window_minutes: u32,
    pub driver_inactivity_minutes: u32,
    pub bad_weather_conditions: Vec<String>,
    pub weather_max_age_minutes: u32,
    pub cache_ttl_secs: u64,
    /// Offset applied to UTC for hour windows and operating hours.
    pub utc_offset_minutes: i32,
}

impl Default for SurgeConfig {
    fn default() -> Self {
        Self {
            demand_window_minutes: 30,
            driver_inactivity_minutes: 30,
            bad_weather_conditions: ["rain", "heavy_rain", "thunderstorm", "snow", "storm", "fog"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            weather_max_age_minutes: 60,
            cache_ttl_secs: 30,
            utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AllocationConfig {
    /// Queue newly created orders for the background assignment worker.
    pub auto_dispatch: bool,
    pub max_distance_km: f64,
    pub min_rating: f64,
    pub max_active_orders: u32,
    pub distance_weight: f64,
    pub rating_weight: f64,
    pub load_weight: f64,
    pub average_speed_kmh: f64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            auto_dispatch: true,
            max_distance_km: 10.0,
            min_rating: 0.0,
            max_active_orders: 1,
            distance_weight: 0.5,
            rating_weight: 0.3,
            load_weight: 0.2,
            average_speed_kmh: 25.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationConfig {
    pub history_limit: usize,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self { history_limit: 100 }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let surge_defaults = SurgeConfig::default();
        let allocation_defaults = AllocationConfig::default();
        let location_defaults = LocationConfig::default();

        let bad_weather_conditions = match env::var("BAD_WEATHER_CONDITIONS") {
            Ok(raw) => raw
                .split(',')
                .map(|c| c.trim().to_ascii_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
            Err(_) => surge_defaults.bad_weather_conditions,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            order_queue_size: parse_or_default("ORDER_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            dispatch: DispatchConfig {
                surge: SurgeConfig {
                    demand_window_minutes: parse_or_default(
                        "DEMAND_WINDOW_MINUTES",
                        surge_defaults.demand_window_minutes,
                    )?,
                    driver_inactivity_minutes: parse_or_default(
                        "DRIVER_INACTIVITY_MINUTES",
                        surge_defaults.driver_inactivity_minutes,
                    )?,
                    bad_weather_conditions,
                    weather_max_age_minutes: parse_or_default(
                        "WEATHER_MAX_AGE_MINUTES",
                        surge_defaults.weather_max_age_minutes,
                    )?,
                    cache_ttl_secs: at_most(
                        "SURGE_CACHE_TTL_SECS",
                        parse_or_default("SURGE_CACHE_TTL_SECS", surge_defaults.cache_ttl_secs)?,
                        MAX_SURGE_CACHE_TTL_SECS,
                    )?,
                    utc_offset_minutes: parse_or_default(
                        "UTC_OFFSET_MINUTES",
                        surge_defaults.utc_offset_minutes,
                    )?,
                },
                allocation: AllocationConfig {
                    auto_dispatch: parse_or_default("AUTO_DISPATCH", allocation_defaults.auto_dispatch)?,
                    max_distance_km: parse_or_default(
                        "MAX_DRIVER_DISTANCE_KM",
                        allocation_defaults.max_distance_km,
                    )?,
                    min_rating: parse_or_default("MIN_DRIVER_RATING", allocation_defaults.min_rating)?,
                    max_active_orders: parse_or_default(
                        "MAX_ACTIVE_ORDERS_PER_DRIVER",
                        allocation_defaults.max_active_orders,
                    )?,
                    distance_weight: parse_or_default(
                        "DISTANCE_WEIGHT",
                        allocation_defaults.distance_weight,
                    )?,
                    rating_weight: parse_or_default("RATING_WEIGHT", allocation_defaults.rating_weight)?,
                    load_weight: parse_or_default("LOAD_WEIGHT", allocation_defaults.load_weight)?,
                    average_speed_kmh: parse_or_default(
                        "AVERAGE_SPEED_KMH",
                        allocation_defaults.average_speed_kmh,
                    )?,
                },
                location: LocationConfig {
                    history_limit: parse_or_default(
                        "LOCATION_HISTORY_LIMIT",
                        location_defaults.history_limit,
                    )?,
                },
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

fn at_most(key: &str, value: u64, max: u64) -> Result<u64, AppError> {
    if value > max {
        return Err(AppError::Internal(format!("invalid {key}: {value} exceeds {max}")));
    }
    Ok(value)
}
