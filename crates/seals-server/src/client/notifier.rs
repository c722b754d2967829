//! User-facing notification sink.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Fire-and-forget; nothing the sink returns is consumed.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => {
                tracing::info!(severity = ?severity, "{message}");
            }
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::{Notifier, Severity};

    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        messages: Mutex<Vec<(Severity, String)>>,
    }

    impl RecordingNotifier {
        pub fn messages(&self) -> Vec<(Severity, String)> {
            self.messages.lock().clone()
        }

        pub fn count(&self, severity: Severity) -> usize {
            self.messages
                .lock()
                .iter()
                .filter(|(s, _)| *s == severity)
                .count()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str, severity: Severity) {
            self.messages.lock().push((severity, message.to_string()));
        }
    }
}
