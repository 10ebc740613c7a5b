use proto::CommandError;

use crate::notify::Notifier;

pub mod cloud;
pub mod dashboards;
pub mod journal;
pub mod rooms;
pub mod system;
pub mod variables;

pub use cloud::CloudPage;
pub use dashboards::DashboardsPage;
pub use journal::{DrainPage, JournalEntry, JournalPage};
pub use rooms::RoomsPage;
pub use system::{PollerHandle, ProcessStatus, SystemPage};
pub use variables::VariablesPage;

/// Transport failures block the page; everything else is recoverable and has
/// already been rolled back by the caller.
pub(crate) fn report_failure(notifier: &dyn Notifier, context: &str, error: &CommandError) {
    let message = format!("{context}: {error}");
    if error.is_fatal() {
        notifier.fatal(&message);
    } else {
        notifier.warning(&message);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use proto::{CommandContent, CommandData, CommandError, CommandOutcome};

    use crate::rpc::ControllerPort;

    /// Canned-reply stand-in for the controller: replies settle immediately
    /// and every command is recorded for assertions.
    #[derive(Default)]
    pub(crate) struct StubPort {
        pub replies: Mutex<VecDeque<CommandOutcome>>,
        pub sent: Mutex<Vec<CommandContent>>,
        pub setting_replies: Mutex<VecDeque<Result<(), CommandError>>>,
        pub settings: Mutex<Vec<(String, String, String)>>,
    }

    impl StubPort {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn push_reply(&self, outcome: CommandOutcome) {
            self.replies.lock().unwrap().push_back(outcome);
        }

        pub(crate) fn push_setting_reply(&self, outcome: Result<(), CommandError>) {
            self.setting_replies.lock().unwrap().push_back(outcome);
        }

        pub(crate) fn sent_commands(&self) -> Vec<CommandContent> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ControllerPort for StubPort {
        async fn send_command(&self, content: CommandContent) -> CommandOutcome {
            self.sent.lock().unwrap().push(content);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(CommandData::default()))
        }

        async fn save_setting(
            &self,
            key: &str,
            param: &str,
            value: &str,
        ) -> Result<(), CommandError> {
            self.settings.lock().unwrap().push((
                key.to_string(),
                param.to_string(),
                value.to_string(),
            ));
            self.setting_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()))
        }
    }
}
