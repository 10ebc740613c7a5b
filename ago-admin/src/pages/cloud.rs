use std::sync::Arc;

use proto::{CommandContent, CommandError};

use crate::{
    inventory::InventoryStore, notify::Notifier, pages::report_failure, rpc::ControllerPort,
};

pub struct CloudPage<P> {
    port: Arc<P>,
    inventory: InventoryStore,
    notifier: Arc<dyn Notifier>,
}

impl<P: ControllerPort> CloudPage<P> {
    pub fn new(port: Arc<P>, inventory: InventoryStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            port,
            inventory,
            notifier,
        }
    }

    /// Submit activation credentials to the cloud bridge. Returns false when
    /// an empty field short-circuited the send.
    pub async fn activate(&self, email: &str, password: &str) -> Result<bool, CommandError> {
        if email.trim().is_empty() || password.trim().is_empty() {
            return Ok(false);
        }
        let content = CommandContent::new(self.inventory.controller_target(), "activatecloud")
            .with("email", email.trim())
            .with("password", password);
        match self.port.send_command(content).await {
            Ok(reply) => {
                let message = reply
                    .message
                    .unwrap_or_else(|| "cloud activation requested".to_string());
                self.notifier.success(&message);
                Ok(true)
            }
            Err(error) => {
                report_failure(self.notifier.as_ref(), "cloud activation", &error);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{notify::testing::RecordingNotifier, pages::testing::StubPort};

    #[tokio::test]
    async fn blank_credentials_skip_the_send() {
        let port = StubPort::new();
        let page = CloudPage::new(
            Arc::clone(&port),
            InventoryStore::new(),
            Arc::new(RecordingNotifier::default()),
        );
        let sent = page
            .activate("", "secret")
            .await
            .expect("skip is not an error");
        assert!(!sent);
        assert!(port.sent_commands().is_empty());
    }

    #[tokio::test]
    async fn activation_posts_credentials_to_the_controller() {
        let port = StubPort::new();
        let page = CloudPage::new(
            Arc::clone(&port),
            InventoryStore::new(),
            Arc::new(RecordingNotifier::default()),
        );
        let sent = page
            .activate("user@example.com", "secret")
            .await
            .expect("activation should succeed");
        assert!(sent);
        let commands = port.sent_commands();
        assert_eq!(commands[0].command, "activatecloud");
        assert_eq!(commands[0].params["email"], "user@example.com");
    }
}
