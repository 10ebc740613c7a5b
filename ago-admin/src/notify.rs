use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
    Fatal,
}

/// Where user-facing outcome messages go. Pages never format their own
/// transport vs. rejection distinction; they pick a severity and hand the
/// text over.
pub trait Notifier: Send + Sync {
    fn notify(&self, severity: Severity, message: &str);

    fn success(&self, message: &str) {
        self.notify(Severity::Success, message);
    }

    fn info(&self, message: &str) {
        self.notify(Severity::Info, message);
    }

    fn warning(&self, message: &str) {
        self.notify(Severity::Warning, message);
    }

    fn error(&self, message: &str) {
        self.notify(Severity::Error, message);
    }

    fn fatal(&self, message: &str) {
        self.notify(Severity::Fatal, message);
    }
}

/// Default sink: structured log lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Success | Severity::Info => info!(kind = ?severity, "{message}"),
            Severity::Warning => warn!("{message}"),
            Severity::Error | Severity::Fatal => error!(kind = ?severity, "{message}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::{Notifier, Severity};

    /// Captures notifications for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub notes: Mutex<Vec<(Severity, String)>>,
    }

    impl RecordingNotifier {
        pub(crate) fn messages_of(&self, severity: Severity) -> Vec<String> {
            self.notes
                .lock()
                .unwrap()
                .iter()
                .filter(|(kind, _)| *kind == severity)
                .map(|(_, message)| message.clone())
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, severity: Severity, message: &str) {
            self.notes.lock().unwrap().push((severity, message.to_string()));
        }
    }
}
