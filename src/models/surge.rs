use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Condition under which a surge rule applies. Each variant is evaluated by
/// its own function in `engine::surge`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurgeCondition {
    /// Local-hour window `[start_hour, end_hour)`; wraps past midnight when
    /// `start_hour > end_hour`.
    TimeWindow {
        start_hour: u8,
        end_hour: u8,
        #[serde(default)]
        days: Option<Vec<Weekday>>,
    },
    DemandThreshold {
        min_orders: u32,
        #[serde(default)]
        window_minutes: Option<u32>,
    },
    /// Empty `conditions` falls back to the configured bad-weather list.
    Weather {
        #[serde(default)]
        conditions: Vec<String>,
    },
    DriverShortage {
        min_drivers: u32,
        max_orders_per_driver: u32,
    },
    ScheduledEvent {
        name: String,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },
}

impl SurgeCondition {
    pub fn kind(&self) -> &'static str {
        match self {
            SurgeCondition::TimeWindow { .. } => "time_window",
            SurgeCondition::DemandThreshold { .. } => "demand_threshold",
            SurgeCondition::Weather { .. } => "weather",
            SurgeCondition::DriverShortage { .. } => "driver_shortage",
            SurgeCondition::ScheduledEvent { .. } => "scheduled_event",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurgeRule {
    pub id: Uuid,
    pub zone_id: Uuid,
    pub name: String,
    pub condition: SurgeCondition,
    pub multiplier: f64,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurgeRuleDraft {
    pub name: String,
    pub condition: SurgeCondition,
    pub multiplier: f64,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub condition: String,
    #[serde(default)]
    pub temperature_c: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

/// Result of evaluating every active rule of a zone.
#[derive(Debug, Clone, Serialize)]
pub struct SurgeEvaluation {
    pub zone_id: Uuid,
    pub multiplier: f64,
    pub satisfied_rules: Vec<Uuid>,
    pub evaluated_at: DateTime<Utc>,
}
