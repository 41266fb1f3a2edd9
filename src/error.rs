use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Which side of a delivery could not be resolved at write time.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReference {
    #[error("subscriber not found")]
    Subscriber,

    #[error("campaign not found")]
    Campaign,

    #[error("subscriber and campaign not found")]
    Both,

    /// A reference was missing at write time but has since reappeared.
    #[error("subscriber or campaign not found")]
    Unknown,
}

impl MissingReference {
    /// Build from existence flags. Returns `None` when both exist.
    pub fn from_presence(subscriber_exists: bool, campaign_exists: bool) -> Option<Self> {
        match (subscriber_exists, campaign_exists) {
            (true, true) => None,
            (false, true) => Some(MissingReference::Subscriber),
            (true, false) => Some(MissingReference::Campaign),
            (false, false) => Some(MissingReference::Both),
        }
    }
}

/// Failures reported by an event store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Unresolved reference: {0}")]
    ReferenceNotFound(MissingReference),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Write interrupted: {0}")]
    Interrupted(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Errors surfaced to callers of the delivery recorder.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("{message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    #[error("{message}")]
    IngestionFailed {
        message: String,
        #[source]
        source: StoreError,
    },
}

impl RecordError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RecordError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            RecordError::IngestionFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            RecordError::InvalidInput { .. } => "invalid_input",
            RecordError::IngestionFailed { .. } => "ingestion_failed",
        }
    }
}

impl IntoResponse for RecordError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}
