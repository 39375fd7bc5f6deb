//! Wire envelope model
//!
//! Outbound: `{"data": {"op": .., ..operation fields.., "message": .., "uuid": ..}}`
//! Inbound success: `{"data": {"op": .., "message": .., "uuid": ..}}`
//! Inbound failure: `{"error": {"code": .., "message": ..}}`
//! Ack (both ways): `{"data": {"op": "ack", "message": <uuid>}}`

use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

pub const OP_START_TRANSACTION: &str = "start_transaction";
pub const OP_CANCEL_TRANSACTION: &str = "cancel_transaction";
pub const OP_COMPLETE_TRANSACTION: &str = "complete_transaction";
pub const OP_NOTIFY: &str = "notify";
pub const OP_NOTIFY_GROUP: &str = "notify_group";
pub const OP_ACK: &str = "ack";
pub const OP_CONNECTION_ESTABLISHED: &str = "connection_established";

/// Outbound operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    StartTransaction,
    CancelTransaction,
    /// Notify one device; delivery is acknowledged
    Notify,
    /// Notify a device group; delivery is acknowledged
    NotifyGroup,
    /// Passthrough for any other op name
    Other(String),
}

impl Operation {
    pub fn as_str(&self) -> &str {
        match self {
            Operation::StartTransaction => OP_START_TRANSACTION,
            Operation::CancelTransaction => OP_CANCEL_TRANSACTION,
            Operation::Notify => OP_NOTIFY,
            Operation::NotifyGroup => OP_NOTIFY_GROUP,
            Operation::Other(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            OP_START_TRANSACTION => Operation::StartTransaction,
            OP_CANCEL_TRANSACTION => Operation::CancelTransaction,
            OP_NOTIFY => Operation::Notify,
            OP_NOTIFY_GROUP => Operation::NotifyGroup,
            other => Operation::Other(other.to_string()),
        }
    }

    /// Notify-class operations carry a uuid, need a peer ack and expect no reply
    pub fn is_notify(&self) -> bool {
        matches!(self, Operation::Notify | Operation::NotifyGroup)
    }
}

/// Recipient of a notify-class operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Serialized as `"group"`
    Group(String),
    /// Serialized as `"identifier"`
    Device(String),
}

/// A logical message queued for delivery
///
/// Immutable once built; [`OutboundMessage::prepare_for_flush`] yields a new
/// value carrying the correlation uuid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    operation: Operation,
    payload: Option<String>,
    transaction_id: Option<String>,
    target: Option<Target>,
    correlation_id: Option<String>,
    requires_ack: bool,
}

impl OutboundMessage {
    /// Generic passthrough message
    pub fn new(operation: Operation, payload: Option<String>) -> Self {
        Self {
            operation,
            payload,
            transaction_id: None,
            target: None,
            correlation_id: None,
            requires_ack: false,
        }
    }

    pub fn start_transaction(payload: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: Some(transaction_id.into()),
            ..Self::new(Operation::StartTransaction, Some(payload.into()))
        }
    }

    pub fn cancel_transaction(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: Some(transaction_id.into()),
            ..Self::new(Operation::CancelTransaction, None)
        }
    }

    pub fn notify_group(message: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            target: Some(Target::Group(group.into())),
            ..Self::new(Operation::NotifyGroup, Some(message.into()))
        }
    }

    pub fn notify(message: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            target: Some(Target::Device(identifier.into())),
            ..Self::new(Operation::Notify, Some(message.into()))
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// True once the message must be acknowledged by the peer
    pub fn requires_ack(&self) -> bool {
        self.requires_ack
    }

    /// True when the message will require an ack once flushed
    pub fn needs_delivery_ack(&self) -> bool {
        self.requires_ack || self.operation.is_notify()
    }

    /// Attach a correlation uuid and mark the message ack-required
    pub fn with_correlation(self, uuid: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(uuid.into()),
            requires_ack: true,
            ..self
        }
    }

    /// Assign a fresh uuid to notify-class messages that have none yet
    pub fn prepare_for_flush(self) -> Self {
        if self.operation.is_notify() && self.correlation_id.is_none() {
            self.with_correlation(Uuid::new_v4().to_string())
        } else {
            self
        }
    }

    /// The `data` object, fields in wire order
    pub fn to_value(&self) -> Value {
        let mut data = Map::new();
        data.insert("op".into(), Value::String(self.operation.as_str().to_string()));
        if let Some(transaction_id) = &self.transaction_id {
            data.insert("transaction_id".into(), Value::String(transaction_id.clone()));
        }
        match &self.target {
            Some(Target::Group(group)) => {
                data.insert("group".into(), Value::String(group.clone()));
            }
            Some(Target::Device(identifier)) => {
                data.insert("identifier".into(), Value::String(identifier.clone()));
            }
            None => {}
        }
        data.insert(
            "message".into(),
            self.payload.clone().map(Value::String).unwrap_or(Value::Null),
        );
        if let Some(uuid) = &self.correlation_id {
            data.insert("uuid".into(), Value::String(uuid.clone()));
        }

        let mut envelope = Map::new();
        envelope.insert("data".into(), Value::Object(data));
        Value::Object(envelope)
    }

    /// Serialize to a newline-free JSON frame
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_value())
    }
}

/// Ack frame echoing `uuid`
pub fn ack_frame(uuid: &str) -> String {
    let mut data = Map::new();
    data.insert("op".into(), Value::String(OP_ACK.to_string()));
    data.insert("message".into(), Value::String(uuid.to_string()));

    let mut envelope = Map::new();
    envelope.insert("data".into(), Value::Object(data));
    Value::Object(envelope).to_string()
}

/// `error` member of an inbound failure envelope
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteErrorBody {
    pub code: i64,
    pub message: String,
}

/// `data` member of an inbound envelope
///
/// Unknown members are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundData {
    #[serde(default)]
    pub op: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

impl InboundData {
    /// `message` as text: strings verbatim, other JSON re-serialized, absent as ""
    pub fn message_text(&self) -> String {
        match &self.message {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.op.as_deref() == Some(op)
    }
}

/// One inbound frame, parsed fresh
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub error: Option<RemoteErrorBody>,
    #[serde(default)]
    pub data: Option<InboundData>,
}

impl InboundEnvelope {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_transaction_frame() {
        let frame = OutboundMessage::start_transaction("{\"Amount\":\"59.0\"}", "T1")
            .encode()
            .unwrap();
        assert_eq!(
            frame,
            r#"{"data":{"op":"start_transaction","transaction_id":"T1","message":"{\"Amount\":\"59.0\"}"}}"#
        );
    }

    #[test]
    fn test_cancel_transaction_has_null_message() {
        let value = OutboundMessage::cancel_transaction("T9").to_value();
        assert_eq!(
            value,
            json!({"data": {"op": "cancel_transaction", "transaction_id": "T9", "message": null}})
        );
    }

    #[test]
    fn test_notify_gets_uuid_at_flush() {
        let message = OutboundMessage::notify_group("update", "groupA");
        assert!(!message.requires_ack());
        assert!(message.needs_delivery_ack());
        assert!(message.correlation_id().is_none());

        let prepared = message.prepare_for_flush();
        assert!(prepared.requires_ack());
        let uuid = prepared.correlation_id().unwrap().to_string();
        assert!(Uuid::parse_str(&uuid).is_ok());

        // Idempotent: a prepared message keeps its uuid
        let again = prepared.clone().prepare_for_flush();
        assert_eq!(again.correlation_id(), Some(uuid.as_str()));

        assert_eq!(
            prepared.to_value(),
            json!({"data": {"op": "notify_group", "group": "groupA", "message": "update", "uuid": uuid}})
        );
    }

    #[test]
    fn test_device_notify_target() {
        let value = OutboundMessage::notify("ping-terminal", "POS1")
            .with_correlation("u-1")
            .to_value();
        assert_eq!(
            value,
            json!({"data": {"op": "notify", "identifier": "POS1", "message": "ping-terminal", "uuid": "u-1"}})
        );
    }

    #[test]
    fn test_passthrough_keeps_op_name() {
        let message = OutboundMessage::new(Operation::from_name("status"), None);
        assert_eq!(message.operation(), &Operation::Other("status".to_string()));
        assert!(!message.needs_delivery_ack());
        assert_eq!(
            message.to_value(),
            json!({"data": {"op": "status", "message": null}})
        );
    }

    #[test]
    fn test_ack_frame() {
        assert_eq!(ack_frame("abc"), r#"{"data":{"op":"ack","message":"abc"}}"#);
    }

    #[test]
    fn test_parse_error_envelope() {
        let envelope = InboundEnvelope::parse(r#"{"error":{"code":4,"message":"bad credentials"}}"#)
            .unwrap();
        assert_eq!(
            envelope.error,
            Some(RemoteErrorBody {
                code: 4,
                message: "bad credentials".to_string()
            })
        );
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_parse_data_envelope() {
        let envelope = InboundEnvelope::parse(
            r#"{"data":{"op":"complete_transaction","transaction_id":"T1","message":"{\"Result\":\"0\"}","uuid":"u-7","extra":1}}"#,
        )
        .unwrap();
        let data = envelope.data.unwrap();
        assert!(data.is_op(OP_COMPLETE_TRANSACTION));
        assert_eq!(data.transaction_id.as_deref(), Some("T1"));
        assert_eq!(data.uuid.as_deref(), Some("u-7"));
        assert_eq!(data.message_text(), r#"{"Result":"0"}"#);
    }

    #[test]
    fn test_non_string_message_is_reserialized() {
        let envelope = InboundEnvelope::parse(r#"{"data":{"op":"status","message":{"a":"b"}}}"#).unwrap();
        assert_eq!(envelope.data.unwrap().message_text(), r#"{"a":"b"}"#);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(InboundEnvelope::parse("not json").is_err());
        assert!(InboundEnvelope::parse(r#"{"error":{"code":"x"}}"#).is_err());
    }
}
