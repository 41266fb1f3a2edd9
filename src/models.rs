use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A delivery notification as received from a sending provider.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryEvent {
    pub subscriber_key: String,
    /// Only used in diagnostics.
    #[serde(default)]
    pub email: String,
    pub campaign_key: String,
    /// Provider-assigned id; the idempotency key.
    #[serde(default)]
    pub message_id: String,
    pub source: String,
    #[serde(default)]
    pub meta: serde_json::Value,
    /// When the provider observed the event. Unset means "now".
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl DeliveryEvent {
    /// Fill in the timestamp, falling back to `now` when unset.
    pub fn normalize(self, now: DateTime<Utc>) -> NewDelivery {
        NewDelivery {
            subscriber_key: self.subscriber_key,
            email: self.email,
            campaign_key: self.campaign_key,
            message_id: self.message_id,
            source: self.source,
            meta: self.meta,
            created_at: self.occurred_at.unwrap_or(now),
        }
    }
}

/// A validated delivery ready to be written to the event store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDelivery {
    pub subscriber_key: String,
    pub email: String,
    pub campaign_key: String,
    pub message_id: String,
    pub source: String,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A delivery as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct DeliveryRecord {
    pub id: i64,
    pub message_id: String,
    pub subscriber_key: String,
    pub campaign_key: String,
    pub source: String,
    #[sqlx(json)]
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// What happened to a recorded delivery.
///
/// Both variants are a success from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Persisted, or already present under the same message id.
    Accepted,
    /// Discarded because the subscriber or campaign no longer exists.
    Dropped,
}

/// A subscriber that deliveries can reference.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Subscriber {
    pub id: i64,
    pub uuid: String,
    pub email: String,
}

/// A campaign that deliveries can reference.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Campaign {
    pub id: i64,
    pub uuid: String,
    pub name: String,
}

/// Response body for an ingested delivery.
#[derive(Debug, Serialize)]
pub struct RecordDeliveryResponse {
    pub status: &'static str,
}
