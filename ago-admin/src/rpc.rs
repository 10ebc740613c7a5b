use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use proto::{
    CommandContent, CommandError, CommandOutcome, ControllerEvent, METHOD_GET_EVENT,
    METHOD_MESSAGE, METHOD_SUBSCRIBE, METHOD_UNSUBSCRIBE, RPC_ERR_NO_EVENT,
    RPC_ERR_SUBSCRIPTION_EXPIRED, RpcFailure, RpcRequest, RpcResponse, SettingsReply,
    normalize_reply,
};
use serde_json::json;
use url::Url;
use uuid::Uuid;

/// The narrow interface pages receive: issue one command and settle exactly
/// once, or write one key through the settings side-channel. Unit tests back
/// this with a canned-reply double.
pub trait ControllerPort: Send + Sync {
    fn send_command(&self, content: CommandContent) -> impl Future<Output = CommandOutcome> + Send;

    fn save_setting(
        &self,
        key: &str,
        param: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), CommandError>> + Send;
}

/// Outcome of one `getevent` long-poll round.
#[derive(Clone, Debug)]
pub enum EventFetch {
    Event(ControllerEvent),
    /// The poll window closed without an event.
    Idle,
    /// The controller no longer knows the subscription id.
    Expired,
}

#[derive(Default)]
pub struct RpcMetrics {
    pub commands_sent_total: AtomicU64,
    pub commands_ok_total: AtomicU64,
    pub commands_error_total: AtomicU64,
    pub settings_writes_total: AtomicU64,
}

/// JSON-RPC client for the controller endpoint. Cloning shares the HTTP pool
/// and the counters.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    rpc_url: Url,
    settings_url: Url,
    reply_timeout: Duration,
    metrics: Arc<RpcMetrics>,
}

pub(crate) enum CallError {
    Transport(String),
    Failure(RpcFailure),
}

impl RpcClient {
    pub fn new(rpc_url: Url, settings_url: Url, reply_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url,
            settings_url,
            reply_timeout,
            metrics: Arc::new(RpcMetrics::default()),
        }
    }

    pub fn metrics(&self) -> &RpcMetrics {
        &self.metrics
    }

    pub(crate) async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, CallError> {
        let request = RpcRequest::new(Uuid::new_v4().to_string(), method, params);
        let response = self
            .http
            .post(self.rpc_url.clone())
            .timeout(self.reply_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|err| CallError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(CallError::Transport(format!(
                "controller endpoint returned status {}",
                response.status()
            )));
        }
        let payload = response
            .json::<RpcResponse>()
            .await
            .map_err(|err| CallError::Transport(format!("invalid rpc payload: {err}")))?;
        if let Some(failure) = payload.error {
            return Err(CallError::Failure(failure));
        }
        Ok(payload.result.unwrap_or(serde_json::Value::Null))
    }

    pub async fn subscribe(&self) -> Result<String, CommandError> {
        let result = self
            .call(METHOD_SUBSCRIBE, json!({}))
            .await
            .map_err(command_error_from_call)?;
        result
            .as_str()
            .map(ToOwned::to_owned)
            .ok_or_else(|| CommandError::transport("subscribe returned no subscription id"))
    }

    pub async fn unsubscribe(&self, subscription: &str) -> Result<(), CommandError> {
        self.call(METHOD_UNSUBSCRIBE, json!({"uuid": subscription}))
            .await
            .map_err(command_error_from_call)?;
        Ok(())
    }

    pub async fn get_event(&self, subscription: &str) -> Result<EventFetch, CommandError> {
        match self
            .call(METHOD_GET_EVENT, json!({"uuid": subscription}))
            .await
        {
            Ok(value) => match serde_json::from_value::<ControllerEvent>(value) {
                Ok(event) => Ok(EventFetch::Event(event)),
                Err(err) => Err(CommandError::transport(format!(
                    "invalid event payload: {err}"
                ))),
            },
            Err(CallError::Failure(failure)) if failure.code == RPC_ERR_NO_EVENT => {
                Ok(EventFetch::Idle)
            }
            Err(CallError::Failure(failure)) if failure.code == RPC_ERR_SUBSCRIPTION_EXPIRED => {
                Ok(EventFetch::Expired)
            }
            Err(err) => Err(command_error_from_call(err)),
        }
    }
}

impl ControllerPort for RpcClient {
    async fn send_command(&self, content: CommandContent) -> CommandOutcome {
        self.metrics
            .commands_sent_total
            .fetch_add(1, Ordering::Relaxed);
        let outcome = match self.call(METHOD_MESSAGE, json!({"content": content})).await {
            Ok(reply) => normalize_reply(reply),
            Err(err) => Err(command_error_from_call(err)),
        };
        match &outcome {
            Ok(_) => self.metrics.commands_ok_total.fetch_add(1, Ordering::Relaxed),
            Err(_) => self
                .metrics
                .commands_error_total
                .fetch_add(1, Ordering::Relaxed),
        };
        outcome
    }

    async fn save_setting(
        &self,
        key: &str,
        param: &str,
        value: &str,
    ) -> Result<(), CommandError> {
        self.metrics
            .settings_writes_total
            .fetch_add(1, Ordering::Relaxed);
        let response = self
            .http
            .get(self.settings_url.clone())
            .timeout(self.reply_timeout)
            .query(&[("key", key), ("param", param), ("value", value)])
            .send()
            .await
            .map_err(|err| CommandError::transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(CommandError::transport(format!(
                "settings endpoint returned status {}",
                response.status()
            )));
        }
        let reply = response
            .json::<SettingsReply>()
            .await
            .map_err(|err| CommandError::transport(format!("invalid settings payload: {err}")))?;
        if reply.is_ok() {
            Ok(())
        } else {
            Err(CommandError::rejected(
                reply
                    .error
                    .unwrap_or_else(|| "settings update rejected".to_string()),
            ))
        }
    }
}

fn command_error_from_call(error: CallError) -> CommandError {
    match error {
        CallError::Transport(message) => CommandError::transport(message),
        CallError::Failure(failure) => {
            let old = failure
                .data
                .as_ref()
                .and_then(|data| data.get("old").cloned());
            CommandError {
                kind: proto::ErrorKind::Rejected,
                message: failure.message,
                identifier: None,
                old,
            }
        }
    }
}
