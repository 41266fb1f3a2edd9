use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::NewDelivery;

/// Result of a successful store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Written {
    Inserted,
    /// A record with the same message id was already present and is kept as is.
    AlreadyExists,
}

/// Durable storage for delivery events.
///
/// Implementations must make `write` atomic and idempotent on
/// `message_id`, and must report unresolvable subscriber/campaign keys as
/// [`StoreError::ReferenceNotFound`] rather than as a generic failure.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn write(&self, delivery: &NewDelivery) -> Result<Written, StoreError>;
}
