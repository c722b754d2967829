//! Client-side pieces a team runs against the shared store: optimistic
//! progress with retries, session fan-out and user notifications.

pub mod listener;
pub mod notifier;
pub mod optimistic;
pub mod reporter;
pub mod team_client;

pub use listener::{SessionHandlers, SessionListener};
pub use notifier::{Notifier, Severity, TracingNotifier};
pub use optimistic::{OptimisticProgress, WriteId, WriteState};
pub use reporter::{ProgressReporter, ReportOutcome};
pub use team_client::TeamClient;
