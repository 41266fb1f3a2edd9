use std::sync::Mutex;

/// Why a diagnostic was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// The event referenced an unknown subscriber or campaign and was discarded.
    Dropped,
    /// The store failed for a reason unrelated to reference resolution.
    Failed,
}

/// An operability trace for a delivery that was not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message_id: String,
    pub subscriber_key: String,
    pub email: String,
    pub campaign_key: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn message(&self) -> &'static str {
        match self.kind {
            DiagnosticKind::Dropped => "delivery event dropped (subscriber or campaign not found)",
            DiagnosticKind::Failed => "error recording delivery",
        }
    }
}

/// Receives diagnostics for dropped and failed deliveries.
///
/// Implementations must not block and cannot fail the calling operation.
pub trait DiagnosticsSink: Send + Sync {
    fn trace(&self, diagnostic: &Diagnostic);
}

/// Sink that forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn trace(&self, d: &Diagnostic) {
        match d.kind {
            DiagnosticKind::Dropped => tracing::warn!(
                message_id = %d.message_id,
                subscriber = %d.subscriber_key,
                email = %d.email,
                campaign = %d.campaign_key,
                reason = %d.detail,
                "{}",
                d.message()
            ),
            DiagnosticKind::Failed => tracing::error!(
                message_id = %d.message_id,
                subscriber = %d.subscriber_key,
                email = %d.email,
                campaign = %d.campaign_key,
                error = %d.detail,
                "{}",
                d.message()
            ),
        }
    }
}

/// Sink that keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    traces: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traces(&self) -> Vec<Diagnostic> {
        match self.traces.lock() {
            Ok(traces) => traces.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl DiagnosticsSink for MemorySink {
    fn trace(&self, diagnostic: &Diagnostic) {
        // A poisoned lock still holds usable data; never fail the caller.
        let mut traces = match self.traces.lock() {
            Ok(traces) => traces,
            Err(poisoned) => poisoned.into_inner(),
        };
        traces.push(diagnostic.clone());
    }
}
