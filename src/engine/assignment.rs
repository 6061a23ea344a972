use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::allocation::auto_assign_order;
use crate::engine::queue::enqueue_order;
use crate::error::AppError;
use crate::state::AppState;

const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Background worker that auto-assigns queued orders one at a time.
pub async fn run_assignment_engine(state: Arc<AppState>, mut order_rx: mpsc::Receiver<Uuid>) {
    info!("assignment engine started");

    while let Some(order_id) = order_rx.recv().await {
        state.metrics.orders_in_queue.dec();

        match auto_assign_order(&state, order_id) {
            Ok(assignment) => {
                info!(order_id = %order_id, driver_id = %assignment.driver_id, "queued order dispatched");
            }
            Err(AppError::NoEligibleDriver(_)) => {
                warn!(order_id = %order_id, "queued order left unassigned");
            }
            Err(AppError::Conflict(reason)) => {
                info!(order_id = %order_id, reason = %reason, "queued order no longer needs a driver");
            }
            Err(err) if err.is_retryable() => {
                warn!(order_id = %order_id, error = %err, "retryable dispatch failure; re-queueing order");
                let state = state.clone();
                tokio::spawn(async move {
                    sleep(RETRY_DELAY).await;
                    if let Err(err) = enqueue_order(&state, order_id).await {
                        error!(order_id = %order_id, error = %err, "failed to re-queue order");
                    }
                });
            }
            Err(err) => {
                error!(order_id = %order_id, error = %err, "failed to process order");
            }
        }
    }

    warn!("assignment engine stopped: queue channel closed");
}
