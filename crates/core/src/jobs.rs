// Job queue contract shared by producers and workers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue consumed by the alert worker.
pub const ALERTS_QUEUE: &str = "alerts";
/// Queue consumed by the digest worker.
pub const DIGEST_QUEUE: &str = "digest";
/// Queue consumed by the retention worker.
pub const RETENTION_QUEUE: &str = "retention";

pub const ALERT_JOB: &str = "alert-check";
pub const DIGEST_JOB: &str = "nightly-digest";
pub const RETENTION_JOB: &str = "data-retention";

/// Payload of an alert-check job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlertJob {
    pub project_id: Uuid,
}

impl AlertJob {
    /// Pending alert checks for the same project coalesce on this key.
    pub fn dedup_key(&self) -> String {
        format!("alert:{}", self.project_id)
    }
}
