use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::AllocationConfig;
use crate::geo::haversine_km;
use crate::models::assignment::ScoreBreakdown;
use crate::models::driver::{Driver, GeoPoint};

/// A driver that passed every hard filter, with its score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub driver_id: Uuid,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub last_location_update: Option<DateTime<Utc>>,
}

pub fn compute_score(
    driver_location: &GeoPoint,
    driver: &Driver,
    pickup: &GeoPoint,
    config: &AllocationConfig,
) -> (f64, ScoreBreakdown) {
    let distance_km = haversine_km(driver_location, pickup);

    let breakdown = ScoreBreakdown {
        distance_km,
        distance_score: distance_score(distance_km),
        rating_score: rating_score(driver.average_rating),
        load_score: load_score(driver.active_orders, config.max_active_orders),
    };

    let score = weighted_score(&breakdown, config);
    (score, breakdown)
}

pub fn weighted_score(breakdown: &ScoreBreakdown, config: &AllocationConfig) -> f64 {
    (breakdown.distance_score * config.distance_weight)
        + (breakdown.rating_score * config.rating_weight)
        + (breakdown.load_score * config.load_weight)
}

/// Best candidate first: higher score, then the fresher position report,
/// then driver id so the order is total.
pub fn rank(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.last_location_update.cmp(&a.last_location_update))
        .then_with(|| a.driver_id.cmp(&b.driver_id))
}

fn distance_score(distance_km: f64) -> f64 {
    1.0 / (1.0 + distance_km.max(0.0))
}

fn load_score(active_orders: u32, capacity: u32) -> f64 {
    if capacity == 0 {
        return 0.0;
    }

    let utilization = active_orders as f64 / capacity as f64;
    (1.0 - utilization).clamp(0.0, 1.0)
}

fn rating_score(rating: f64) -> f64 {
    (rating / 5.0).clamp(0.0, 1.0)
}
