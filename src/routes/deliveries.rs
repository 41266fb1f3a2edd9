use axum::{extract::State, Json};

use crate::error::RecordError;
use crate::models::{DeliveryEvent, RecordDeliveryResponse};
use crate::state::AppState;

/// POST /api/deliveries - Record a provider delivery notification.
///
/// Dropped events answer exactly like accepted ones.
pub async fn record_delivery(
    State(state): State<AppState>,
    Json(event): Json<DeliveryEvent>,
) -> Result<Json<RecordDeliveryResponse>, RecordError> {
    state.recorder.record_delivery(event).await?;
    Ok(Json(RecordDeliveryResponse { status: "ok" }))
}
