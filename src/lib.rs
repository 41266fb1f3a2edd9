pub mod config;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod messages;
pub mod models;
pub mod recorder;
pub mod routes;
pub mod state;
pub mod store;

pub use config::{Config, ConfigError};
pub use db::{init_pool, run_migrations, SqliteEventStore};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink, MemorySink, TracingSink};
pub use error::{MissingReference, RecordError, StoreError};
pub use messages::{DefaultMessages, Messages};
pub use models::{DeliveryEvent, DeliveryRecord, NewDelivery, RecordOutcome};
pub use recorder::DeliveryRecorder;
pub use routes::create_router;
pub use state::AppState;
pub use store::{EventStore, Written};
