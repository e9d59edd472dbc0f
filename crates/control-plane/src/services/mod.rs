// Services layer
// Services own the pipeline logic and only see core traits and the broker

pub mod ingest;
pub mod realtime;

pub use ingest::{IngestInput, IngestService, RECENT_EVENTS_LIMIT};
pub use realtime::{Connection, ConnectionState, LiveSubscription, RealtimeService};
