//! Delivery recorder.
//!
//! Validates and normalizes inbound delivery events, writes them to the
//! event store and classifies the store's answer into accepted, dropped or
//! failed.

use std::sync::Arc;

use chrono::Utc;

use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink};
use crate::error::{RecordError, StoreError};
use crate::messages::Messages;
use crate::models::{DeliveryEvent, NewDelivery, RecordOutcome};
use crate::store::EventStore;

/// Records delivery events into an [`EventStore`].
///
/// Stateless apart from its collaborators; safe to share and call
/// concurrently, including with the same message id.
#[derive(Clone)]
pub struct DeliveryRecorder {
    store: Arc<dyn EventStore>,
    sink: Arc<dyn DiagnosticsSink>,
    messages: Arc<dyn Messages>,
}

impl DeliveryRecorder {
    pub fn new(
        store: Arc<dyn EventStore>,
        sink: Arc<dyn DiagnosticsSink>,
        messages: Arc<dyn Messages>,
    ) -> Self {
        Self {
            store,
            sink,
            messages,
        }
    }

    /// Record a delivery event.
    ///
    /// Returns `Ok(Accepted)` when the event is stored (or was already
    /// stored under the same message id) and `Ok(Dropped)` when its
    /// subscriber or campaign can't be resolved. Any other store failure is
    /// returned as [`RecordError::IngestionFailed`]; nothing is retried.
    ///
    /// Once issued, the store write runs to completion even if the returned
    /// future is dropped.
    pub async fn record_delivery(&self, event: DeliveryEvent) -> Result<RecordOutcome, RecordError> {
        if event.message_id.is_empty() {
            return Err(RecordError::InvalidInput {
                field: "message_id",
                message: self.messages.invalid_data(),
            });
        }

        let delivery = Arc::new(event.normalize(Utc::now()));

        let store = self.store.clone();
        let pending = delivery.clone();
        let result = match tokio::spawn(async move { store.write(&pending).await }).await {
            Ok(result) => result,
            Err(e) => Err(StoreError::Interrupted(e.to_string())),
        };

        match result {
            Ok(_) => Ok(RecordOutcome::Accepted),
            Err(StoreError::ReferenceNotFound(missing)) => {
                self.sink.trace(&diagnostic(
                    DiagnosticKind::Dropped,
                    &delivery,
                    missing.to_string(),
                ));
                Ok(RecordOutcome::Dropped)
            }
            Err(err) => {
                self.sink
                    .trace(&diagnostic(DiagnosticKind::Failed, &delivery, err.to_string()));
                Err(RecordError::IngestionFailed {
                    message: self.messages.error_saving("delivery"),
                    source: err,
                })
            }
        }
    }
}

fn diagnostic(kind: DiagnosticKind, delivery: &NewDelivery, detail: String) -> Diagnostic {
    Diagnostic {
        kind,
        message_id: delivery.message_id.clone(),
        subscriber_key: delivery.subscriber_key.clone(),
        email: delivery.email.clone(),
        campaign_key: delivery.campaign_key.clone(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};

    use crate::diagnostics::MemorySink;
    use crate::error::MissingReference;
    use crate::messages::DefaultMessages;
    use crate::store::memory::InMemoryEventStore;
    use crate::store::Written;

    fn setup() -> (DeliveryRecorder, Arc<InMemoryEventStore>, Arc<MemorySink>) {
        let store = Arc::new(InMemoryEventStore::new());
        store.add_subscriber("s1");
        store.add_campaign("c1");
        let sink = Arc::new(MemorySink::new());
        let recorder =
            DeliveryRecorder::new(store.clone(), sink.clone(), Arc::new(DefaultMessages));
        (recorder, store, sink)
    }

    fn event(message_id: &str) -> DeliveryEvent {
        DeliveryEvent {
            subscriber_key: "s1".to_string(),
            email: "a@example.com".to_string(),
            campaign_key: "c1".to_string(),
            message_id: message_id.to_string(),
            source: "ses".to_string(),
            meta: serde_json::json!({"event": "delivery"}),
            occurred_at: None,
        }
    }

    fn assert_close_to_now(at: DateTime<Utc>, before: DateTime<Utc>) {
        let after = Utc::now();
        assert!(at >= before && at <= after, "{} not in [{}, {}]", at, before, after);
    }

    #[tokio::test]
    async fn test_accepts_and_defaults_timestamp() {
        let (recorder, store, sink) = setup();
        let before = Utc::now();

        let outcome = recorder.record_delivery(event("m-100")).await.unwrap();

        assert_eq!(outcome, RecordOutcome::Accepted);
        let record = store.get("m-100").unwrap();
        assert_close_to_now(record.created_at, before);
        assert_eq!(record.source, "ses");
        assert_eq!(record.meta["event"], "delivery");
        assert!(sink.traces().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_timestamp_is_kept() {
        let (recorder, store, _) = setup();
        let at = Utc.with_ymd_and_hms(2023, 6, 15, 8, 30, 0).unwrap();

        let mut ev = event("m-ts");
        ev.occurred_at = Some(at);
        recorder.record_delivery(ev).await.unwrap();

        assert_eq!(store.get("m-ts").unwrap().created_at, at);
    }

    #[tokio::test]
    async fn test_duplicate_message_id_is_accepted_once() {
        let (recorder, store, sink) = setup();

        let first = recorder.record_delivery(event("m-100")).await.unwrap();

        let mut changed = event("m-100");
        changed.source = "other".to_string();
        changed.meta = serde_json::json!({"event": "bounce"});
        let second = recorder.record_delivery(changed).await.unwrap();

        assert_eq!(first, RecordOutcome::Accepted);
        assert_eq!(second, RecordOutcome::Accepted);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("m-100").unwrap().source, "ses");
        assert!(sink.traces().is_empty());
    }

    #[tokio::test]
    async fn test_empty_message_id_never_reaches_store() {
        let (recorder, store, sink) = setup();

        let err = recorder.record_delivery(event("")).await.unwrap_err();

        assert!(matches!(
            err,
            RecordError::InvalidInput {
                field: "message_id",
                ..
            }
        ));
        assert_eq!(err.to_string(), "Invalid data");
        assert_eq!(store.write_count(), 0);
        assert!(store.is_empty());
        assert!(sink.traces().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_campaign_is_dropped() {
        let (recorder, store, sink) = setup();

        let mut ev = event("m-101");
        ev.campaign_key = "missing".to_string();
        let outcome = recorder.record_delivery(ev).await.unwrap();

        assert_eq!(outcome, RecordOutcome::Dropped);
        assert!(store.is_empty());

        let traces = sink.traces();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].kind, DiagnosticKind::Dropped);
        assert_eq!(traces[0].email, "a@example.com");
        assert_eq!(traces[0].campaign_key, "missing");
    }

    #[tokio::test]
    async fn test_deleted_subscriber_is_dropped() {
        let (recorder, store, sink) = setup();
        store.remove_subscriber("s1");

        let outcome = recorder.record_delivery(event("m-102")).await.unwrap();

        assert_eq!(outcome, RecordOutcome::Dropped);
        assert!(store.is_empty());
        assert_eq!(sink.traces().len(), 1);
        assert_eq!(sink.traces()[0].detail, "subscriber not found");
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let (recorder, store, sink) = setup();
        store.fail_next_write(StoreError::Database("connection refused".to_string()));

        let err = recorder.record_delivery(event("m-103")).await.unwrap_err();

        match &err {
            RecordError::IngestionFailed { message, source } => {
                assert_eq!(message, "Error saving delivery");
                assert_eq!(source, &StoreError::Database("connection refused".to_string()));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(store.is_empty());

        let traces = sink.traces();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].kind, DiagnosticKind::Failed);
        assert!(traces[0].detail.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_failure_is_not_retried() {
        let (recorder, store, _) = setup();
        store.fail_next_write(StoreError::Serialization("bad payload".to_string()));

        assert!(recorder.record_delivery(event("m-104")).await.is_err());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_store_one_record() {
        let (recorder, store, _) = setup();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let recorder = recorder.clone();
            handles.push(tokio::spawn(async move {
                recorder.record_delivery(event("m-concurrent")).await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), RecordOutcome::Accepted);
        }
        assert_eq!(store.len(), 1);
    }

    /// Delays every write, then delegates to an in-memory store.
    struct SlowStore {
        inner: Arc<InMemoryEventStore>,
        delay: Duration,
    }

    #[async_trait]
    impl EventStore for SlowStore {
        async fn write(&self, delivery: &NewDelivery) -> Result<Written, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.write(delivery).await
        }
    }

    #[tokio::test]
    async fn test_issued_write_survives_caller_timeout() {
        let inner = Arc::new(InMemoryEventStore::new());
        inner.add_subscriber("s1");
        inner.add_campaign("c1");
        let store = Arc::new(SlowStore {
            inner: inner.clone(),
            delay: Duration::from_millis(50),
        });
        let recorder = DeliveryRecorder::new(
            store,
            Arc::new(MemorySink::new()),
            Arc::new(DefaultMessages),
        );

        let timed_out = tokio::time::timeout(
            Duration::from_millis(5),
            recorder.record_delivery(event("m-slow")),
        )
        .await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(inner.get("m-slow").is_some());
    }

    /// Panics on every write.
    struct PanickingStore;

    #[async_trait]
    impl EventStore for PanickingStore {
        async fn write(&self, _delivery: &NewDelivery) -> Result<Written, StoreError> {
            panic!("driver bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_store_is_reported_as_failure() {
        let sink = Arc::new(MemorySink::new());
        let recorder = DeliveryRecorder::new(
            Arc::new(PanickingStore),
            sink.clone(),
            Arc::new(DefaultMessages),
        );

        let err = recorder.record_delivery(event("m-panic")).await.unwrap_err();

        assert!(matches!(
            err,
            RecordError::IngestionFailed {
                source: StoreError::Interrupted(_),
                ..
            }
        ));
        assert_eq!(sink.traces().len(), 1);
    }

    #[tokio::test]
    async fn test_reference_variants_are_all_absorbed() {
        for missing in [
            MissingReference::Subscriber,
            MissingReference::Campaign,
            MissingReference::Both,
            MissingReference::Unknown,
        ] {
            let (recorder, store, sink) = setup();
            store.fail_next_write(StoreError::ReferenceNotFound(missing));

            let outcome = recorder.record_delivery(event("m-ref")).await.unwrap();

            assert_eq!(outcome, RecordOutcome::Dropped);
            assert_eq!(sink.traces().len(), 1);
        }
    }
}
