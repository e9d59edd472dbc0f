// PulseBoard background workers
//
// Three queues, three workers:
// - alerts: trailing-window error count per project, emails the owner past a threshold
// - digest: nightly per-user summary of every owned project
// - retention: nightly deletion of events past the retention horizon
//
// Recurring work (digest, retention) is registered in the job store by
// `scheduler::bootstrap_schedules` and materialized by the durable
// RepeatScheduler, so it survives restarts and never fires twice per slot.

pub mod alert;
pub mod config;
pub mod digest;
pub mod email;
pub mod retention;
pub mod runtime;
pub mod scheduler;

pub use alert::{alert_check_job, AlertOutcome, AlertWorker};
pub use config::{MailConfig, MailTransport, SmtpConfig, WorkerConfig};
pub use digest::{DigestFailure, DigestReport, DigestWorker};
pub use email::{
    mailer_from_config, render_alert_email, render_digest_email, HttpMailer, LogMailer,
    ProjectSummary, RecordingMailer, SmtpMailer, MAIL_SEND_TIMEOUT,
};
pub use retention::{RetentionReport, RetentionWorker};
pub use runtime::WorkerRuntime;
pub use scheduler::{bootstrap_schedules, ScheduleConfig};
