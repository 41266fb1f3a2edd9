use std::sync::Arc;

use crate::recorder::DeliveryRecorder;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub recorder: Arc<DeliveryRecorder>,
}

impl AppState {
    pub fn new(recorder: DeliveryRecorder) -> Self {
        Self {
            recorder: Arc::new(recorder),
        }
    }
}
