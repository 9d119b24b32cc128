//! Payload types shared by the RPC server, the fan-out layer and the database.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

macro_rules! define_int_id {
    ($name:ident, $label:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub fn get(self) -> i64 {
                self.0
            }

            /// Unsigned form used in wire headers. Negative ids never leave GDB.
            pub fn as_u64(self) -> u64 {
                self.0.max(0) as u64
            }

            pub fn label() -> &'static str {
                $label
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_int_id!(RecordId, "record ID");
define_int_id!(PolygonId, "polygon ID");

// ============================================================================
// Local write outcome
// ============================================================================

/// Result of a single mutating GDB command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Row committed; carries the generated id.
    Success(RecordId),
    /// The command was rejected. The cause is the driver's message.
    Failure(String),
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WriteOutcome::Success(_))
    }

    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            WriteOutcome::Success(id) => Some(*id),
            WriteOutcome::Failure(_) => None,
        }
    }
}

// ============================================================================
// Remote (core node) outcome
// ============================================================================

/// What happened when one destination was contacted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOutcome {
    /// The node answered; payload is its reply, untouched.
    Delivered(Value),
    /// No address on record, connection refused, or timed out.
    Missing,
    /// Connected, but the exchange broke down (auth rejected, bad frame, ...).
    Failed(String),
}

impl RemoteOutcome {
    pub fn is_missing(&self) -> bool {
        matches!(self, RemoteOutcome::Missing)
    }
}

/// Per-destination entry of `ar_response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCallResult {
    pub destination: PolygonId,
    pub result: RemoteOutcome,
}

impl RemoteCallResult {
    pub fn missing(destination: PolygonId) -> Self {
        Self {
            destination,
            result: RemoteOutcome::Missing,
        }
    }
}

/// Local outcome plus whatever the fan-out collected.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteReport {
    pub outcome: WriteOutcome,
    /// `None` when no propagation layer ran (or the local write failed).
    pub ar_response: Option<Vec<RemoteCallResult>>,
}

impl WriteReport {
    pub fn local(outcome: WriteOutcome) -> Self {
        Self {
            outcome,
            ar_response: None,
        }
    }
}

impl From<WriteOutcome> for WriteReport {
    fn from(outcome: WriteOutcome) -> Self {
        Self::local(outcome)
    }
}

// ============================================================================
// Inbound RPC envelope
// ============================================================================

/// Request accepted by the RPC server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positional: Vec<Value>,
}

impl RpcRequest {
    pub fn named(method: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            method: method.into(),
            args,
            positional: Vec::new(),
        }
    }
}

/// Reply sent back for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub status: bool,
    pub info: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ar_response: Option<Vec<RemoteCallResult>>,
}

impl RpcResponse {
    pub fn ok(info: impl Into<Value>) -> Self {
        Self {
            status: true,
            info: info.into(),
            ar_response: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: false,
            info: Value::String(message.into()),
            ar_response: None,
        }
    }

    /// Shape a write report the way clients expect it.
    pub fn from_report(report: WriteReport) -> Self {
        match report.outcome {
            WriteOutcome::Success(id) => Self {
                status: true,
                info: Value::from(id.get()),
                ar_response: report.ar_response,
            },
            WriteOutcome::Failure(cause) => Self {
                status: false,
                info: Value::String(cause),
                ar_response: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_report_carries_ar_response() {
        let report = WriteReport {
            outcome: WriteOutcome::Success(RecordId::new(42)),
            ar_response: Some(vec![RemoteCallResult {
                destination: PolygonId::new(9),
                result: RemoteOutcome::Delivered(json!({"status": true})),
            }]),
        };
        let value = serde_json::to_value(RpcResponse::from_report(report)).unwrap();
        assert_eq!(
            value,
            json!({
                "status": true,
                "info": 42,
                "ar_response": [{"destination": 9, "result": {"delivered": {"status": true}}}]
            })
        );
    }

    #[test]
    fn test_failure_report_omits_ar_response() {
        let report = WriteReport::local(WriteOutcome::Failure("UNIQUE constraint failed".into()));
        let value = serde_json::to_value(RpcResponse::from_report(report)).unwrap();
        assert_eq!(value, json!({"status": false, "info": "UNIQUE constraint failed"}));
    }

    #[test]
    fn test_missing_serializes_as_plain_tag() {
        let value = serde_json::to_value(RemoteCallResult::missing(PolygonId::new(9))).unwrap();
        assert_eq!(value, json!({"destination": 9, "result": "missing"}));
    }

    #[test]
    fn test_request_defaults() {
        let req: RpcRequest = serde_json::from_str(r#"{"method": "ping"}"#).unwrap();
        assert_eq!(req.method, "ping");
        assert!(req.args.is_empty());
        assert!(req.positional.is_empty());
    }
}
