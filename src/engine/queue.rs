use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub async fn enqueue_order(state: &AppState, order_id: Uuid) -> Result<(), AppError> {
    state
        .order_tx
        .send(order_id)
        .await
        .map_err(|err| AppError::Internal(format!("order queue send failed: {err}")))?;

    state.metrics.orders_in_queue.inc();
    Ok(())
}
