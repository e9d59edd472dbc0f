// PulseBoard Core
//
// This crate holds the storage-agnostic pieces shared by the control-plane
// (ingestion + realtime) and the background workers.
//
// Key design decisions:
// - Collaborators (event store, project lookups, email) are traits so the
//   server and the workers can run against PostgreSQL or in-memory fakes
// - Domain entity types (Event, Project) are defined here and serialize to
//   the camelCase JSON the dashboard and SDKs speak
// - The channel naming convention lives in one place (`channel`)
// - Job payloads and queue names are shared between the producer (ingest)
//   and the consumers (workers)

pub mod channel;
pub mod error;
pub mod event;
pub mod jobs;
pub mod project;
pub mod telemetry;
pub mod traits;

// Re-exports for convenience
pub use channel::{project_channel, project_id_from_channel};
pub use error::{PulseError, Result};
pub use event::{Event, EventType, NewEvent};
pub use project::{DigestRecipient, Project, ProjectOwner};
pub use traits::{EmailMessage, EventStore, Mailer, ProjectDirectory};
