//! Terminal-side command parsing and result decoding

use serde::Deserialize;
use serde_json::json;
use std::fmt;

/// Outcome reported by the payment terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionResult {
    Accepted,
    Declined,
    Aborted,
    Unknown,
}

#[derive(Deserialize)]
struct TerminalReply {
    #[serde(rename = "ResultCode")]
    result_code: Option<serde_json::Value>,
}

impl TransactionResult {
    pub fn from_code(code: &str) -> Self {
        match code {
            "0" => Self::Accepted,
            "1" => Self::Declined,
            "9" => Self::Aborted,
            _ => Self::Unknown,
        }
    }

    /// Decode the `ResultCode` of a terminal reply
    ///
    /// Replies that are not JSON objects, or carry no code, are `Unknown`.
    pub fn from_message(message: &str) -> Self {
        let code = serde_json::from_str::<TerminalReply>(message)
            .ok()
            .and_then(|reply| reply.result_code)
            .map(|code| match code {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });

        code.map(|c| Self::from_code(&c)).unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for TransactionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Accepted => "Accepted",
            Self::Declined => "Declined",
            Self::Aborted => "Aborted",
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// One line of interactive input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    StartTransaction(String),
    CancelTransaction(String),
    NotifyGroup(String),
    Quit,
}

impl ClientCommand {
    /// Parse `<command> <argument>`; `None` for anything unrecognised
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let command = parts.next()?;
        let argument = parts.next().map(str::to_string);
        if parts.next().is_some() {
            return None;
        }

        match (command, argument) {
            ("start_transaction", Some(id)) => Some(Self::StartTransaction(id)),
            ("cancel_transaction", Some(id)) => Some(Self::CancelTransaction(id)),
            ("notify_group", Some(group)) => Some(Self::NotifyGroup(group)),
            ("quit" | "exit", None) => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Sample sale request sent by `start_transaction`
pub fn sample_payload(transaction_id: &str) -> String {
    json!({
        "Amount": "59.0",
        "CurrencyCode": "203",
        "Operation": "CP",
        "TransactionID": transaction_id,
        "InvNumber": "2532000001"
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_codes() {
        assert_eq!(TransactionResult::from_message(r#"{"ResultCode":"0"}"#), TransactionResult::Accepted);
        assert_eq!(TransactionResult::from_message(r#"{"ResultCode":"1"}"#), TransactionResult::Declined);
        assert_eq!(TransactionResult::from_message(r#"{"ResultCode":"9"}"#), TransactionResult::Aborted);
        assert_eq!(TransactionResult::from_message(r#"{"ResultCode":"5"}"#), TransactionResult::Unknown);
        assert_eq!(TransactionResult::from_message(r#"{"ResultCode":0}"#), TransactionResult::Accepted);
        assert_eq!(TransactionResult::from_message("not json"), TransactionResult::Unknown);
        assert_eq!(TransactionResult::from_message("{}"), TransactionResult::Unknown);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            ClientCommand::parse("start_transaction T1"),
            Some(ClientCommand::StartTransaction("T1".to_string()))
        );
        assert_eq!(
            ClientCommand::parse("  cancel_transaction   T1 "),
            Some(ClientCommand::CancelTransaction("T1".to_string()))
        );
        assert_eq!(
            ClientCommand::parse("notify_group groupA"),
            Some(ClientCommand::NotifyGroup("groupA".to_string()))
        );
        assert_eq!(ClientCommand::parse("quit"), Some(ClientCommand::Quit));
        assert_eq!(ClientCommand::parse("start_transaction"), None);
        assert_eq!(ClientCommand::parse("start_transaction T1 extra"), None);
        assert_eq!(ClientCommand::parse("refund T1"), None);
        assert_eq!(ClientCommand::parse(""), None);
    }

    #[test]
    fn test_sample_payload_carries_id() {
        let payload: serde_json::Value = serde_json::from_str(&sample_payload("T7")).unwrap();
        assert_eq!(payload["TransactionID"], "T7");
        assert_eq!(payload["Operation"], "CP");
    }
}
