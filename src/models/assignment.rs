use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub distance_km: f64,
    pub distance_score: f64,
    pub rating_score: f64,
    pub load_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Released { reason: String },
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Top-ranked eligible driver for an order.
#[derive(Debug, Clone, Serialize)]
pub struct DriverMatch {
    pub driver_id: Uuid,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub pickup_eta_minutes: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    Assigned { driver_id: Uuid, score: f64 },
    NoEligibleDriver,
    Conflict { message: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub order_id: Uuid,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub assigned: usize,
    pub unassigned: usize,
    pub items: Vec<BatchItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reassignment {
    pub order_id: Uuid,
    pub previous_driver_id: Option<Uuid>,
    pub assignment: Option<Assignment>,
}
