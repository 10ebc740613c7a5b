use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

pub const METHOD_MESSAGE: &str = "message";
pub const METHOD_SUBSCRIBE: &str = "subscribe";
pub const METHOD_UNSUBSCRIBE: &str = "unsubscribe";
pub const METHOD_GET_EVENT: &str = "getevent";

/// No event arrived before the long-poll window closed.
pub const RPC_ERR_NO_EVENT: i64 = -32100;
/// The subscription id is unknown to the controller; re-subscribe.
pub const RPC_ERR_SUBSCRIPTION_EXPIRED: i64 = -32101;

/// A command addressed to one device or to the controller itself. Keys beyond
/// `uuid` and `command` are command-specific and pass through unvalidated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandContent {
    pub uuid: String,
    pub command: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl CommandContent {
    pub fn new(uuid: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            command: command.into(),
            params: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Canonical success payload of a command.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommandData {
    pub data: Value,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network-level failure; the command may or may not have reached the
    /// controller.
    Transport,
    /// The controller processed the command and rejected it.
    Rejected,
    /// Rejected client-side before anything was sent.
    Validation,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub identifier: Option<String>,
    /// Previous value, when the controller supplies one for rollback.
    #[serde(default)]
    pub old: Option<Value>,
}

impl CommandError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transport,
            message: message.into(),
            identifier: None,
            old: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Rejected,
            message: message.into(),
            identifier: None,
            old: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: message.into(),
            identifier: None,
            old: None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::Transport
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.identifier {
            Some(identifier) => write!(formatter, "{} ({identifier})", self.message),
            None => write!(formatter, "{}", self.message),
        }
    }
}

impl std::error::Error for CommandError {}

pub type CommandOutcome = Result<CommandData, CommandError>;

/// Collapse every reply shape the controller has ever produced into the
/// canonical outcome. Shapes handled:
///
/// - `{"error": {"message", "identifier", "data": {"old"}}}` — rejection
/// - `{"data": ..., "message": ...}` — current envelope
/// - `{"result": <any of these>}` — legacy nesting, unwrapped recursively
/// - `{"rc": 0, ...}` / bare integer — legacy return codes, zero is success
/// - any other payload — legacy bare data, passed through as `data`
pub fn normalize_reply(reply: Value) -> CommandOutcome {
    match reply {
        Value::Object(mut object) => {
            if let Some(error) = object.remove("error") {
                return Err(error_from_value(error));
            }
            if let Some(data) = object.remove("data") {
                let message = object
                    .remove("message")
                    .and_then(|value| value.as_str().map(ToOwned::to_owned));
                return Ok(CommandData { data, message });
            }
            if let Some(inner) = object.remove("result") {
                return normalize_reply(inner);
            }
            if let Some(code) = object.get("rc").and_then(Value::as_i64) {
                if code == 0 {
                    object.remove("rc");
                    return Ok(CommandData {
                        data: Value::Object(object),
                        message: None,
                    });
                }
                let message = object
                    .get("msg")
                    .or_else(|| object.get("message"))
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned)
                    .unwrap_or_else(|| format!("command returned code {code}"));
                return Err(CommandError::rejected(message));
            }
            Ok(CommandData {
                data: Value::Object(object),
                message: None,
            })
        }
        Value::Number(number) => match number.as_i64() {
            Some(0) => Ok(CommandData::default()),
            _ => Err(CommandError::rejected(format!(
                "command returned code {number}"
            ))),
        },
        other => Ok(CommandData {
            data: other,
            message: None,
        }),
    }
}

fn error_from_value(error: Value) -> CommandError {
    match error {
        Value::Object(mut object) => {
            let message = object
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("command failed")
                .to_string();
            let identifier = object
                .get("identifier")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned);
            let old = object
                .remove("data")
                .and_then(|data| data.get("old").cloned());
            CommandError {
                kind: ErrorKind::Rejected,
                message,
                identifier,
                old,
            }
        }
        Value::String(message) => CommandError::rejected(message),
        other => CommandError::rejected(format!("command failed: {other}")),
    }
}

/// One push event from the controller. The body carries whatever the emitting
/// device attached; only the subject is guaranteed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControllerEvent {
    #[serde(rename = "event")]
    pub subject: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl ControllerEvent {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcFailure>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcFailure {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Reply of the key/value settings side-channel (favorites persistence).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettingsReply {
    pub result: i64,
    #[serde(default)]
    pub error: Option<String>,
}

impl SettingsReply {
    pub fn is_ok(&self) -> bool {
        self.result == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_envelope_normalizes_to_data_and_message() {
        let outcome = normalize_reply(json!({
            "data": {"uuid": "room-42"},
            "message": "room created",
        }));
        let data = outcome.expect("current envelope is a success");
        assert_eq!(data.data["uuid"], "room-42");
        assert_eq!(data.message.as_deref(), Some("room created"));
    }

    #[test]
    fn legacy_nested_result_is_unwrapped() {
        let outcome = normalize_reply(json!({
            "result": {"data": {"uuid": "room-42"}},
        }));
        assert_eq!(outcome.expect("nested result").data["uuid"], "room-42");
    }

    #[test]
    fn legacy_bare_payload_becomes_data() {
        let outcome = normalize_reply(json!({"result": {"rooms": []}}));
        assert!(outcome.expect("bare payload").data["rooms"].is_array());
    }

    #[test]
    fn legacy_return_codes_map_zero_to_success() {
        assert!(normalize_reply(json!({"result": 0})).is_ok());
        assert!(normalize_reply(json!(0)).is_ok());
        let error = normalize_reply(json!({"result": -1})).expect_err("nonzero is a rejection");
        assert_eq!(error.kind, ErrorKind::Rejected);
    }

    #[test]
    fn legacy_rc_object_keeps_remaining_fields_as_data() {
        let outcome = normalize_reply(json!({"rc": 0, "processes": ["agoresolver"]}));
        let data = outcome.expect("rc zero");
        assert_eq!(data.data["processes"][0], "agoresolver");

        let error = normalize_reply(json!({"rc": 2, "msg": "no such process"}))
            .expect_err("nonzero rc is a rejection");
        assert_eq!(error.message, "no such process");
    }

    #[test]
    fn error_envelope_carries_identifier_and_old_value() {
        let error = normalize_reply(json!({
            "error": {
                "message": "cannot rename room",
                "identifier": "error.room.rename",
                "data": {"old": "Kitchen"},
            }
        }))
        .expect_err("error envelope");
        assert_eq!(error.kind, ErrorKind::Rejected);
        assert_eq!(error.identifier.as_deref(), Some("error.room.rename"));
        assert_eq!(error.old, Some(json!("Kitchen")));
    }

    #[test]
    fn event_body_flattens_extra_fields() {
        let event: ControllerEvent = serde_json::from_value(json!({
            "event": "event.device.statechanged",
            "uuid": "dev-1",
            "level": 42,
        }))
        .expect("event should decode");
        assert_eq!(event.subject, "event.device.statechanged");
        assert_eq!(event.uuid.as_deref(), Some("dev-1"));
        assert_eq!(event.field("level"), Some(&json!(42)));
    }

    #[test]
    fn command_content_flattens_params() {
        let content = CommandContent::new("controller-1", "setroomname").with("name", "Kitchen");
        let encoded = serde_json::to_value(&content).expect("content should encode");
        assert_eq!(encoded["uuid"], "controller-1");
        assert_eq!(encoded["command"], "setroomname");
        assert_eq!(encoded["name"], "Kitchen");
    }
}
