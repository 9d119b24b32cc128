//! Typed calls understood by core nodes.
//!
//! A core node exposes a small "add reference data" API. WServer only ever
//! pushes newly created rows, each tagged with its GDB id (`wserver_id`) so
//! the node can keep both sides linked.

use crate::error::ProtocolError;
use crate::types::RecordId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical kind of data being propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreOperation {
    Operator,
    Auto,
    TrashCat,
    TrashType,
    Company,
}

impl CoreOperation {
    pub const ALL: [CoreOperation; 5] = [
        CoreOperation::Operator,
        CoreOperation::Auto,
        CoreOperation::TrashCat,
        CoreOperation::TrashType,
        CoreOperation::Company,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Auto => "auto",
            Self::TrashCat => "trash_cat",
            Self::TrashType => "trash_type",
            Self::Company => "company",
        }
    }
}

impl fmt::Display for CoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoreOperation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownOperation(s.to_string()))
    }
}

/// One remote call, serialized as `{"method": "...", "args": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum CoreCall {
    AddOperator {
        full_name: String,
        login: String,
        password: String,
        wserver_id: RecordId,
    },
    AddAuto {
        car_number: String,
        wserver_id: RecordId,
        model: Option<i64>,
        rfid_id: Option<i64>,
        id_type: Option<String>,
        rg_weight: Option<i64>,
    },
    AddTrashCat {
        name: String,
        wserver_id: RecordId,
    },
    AddTrashType {
        name: String,
        wserver_id: RecordId,
        category: Option<i64>,
    },
    AddCarrier {
        name: String,
        inn: Option<String>,
        kpp: Option<String>,
        ex_id: Option<String>,
        status: Option<bool>,
        wserver_id: RecordId,
        active: Option<bool>,
    },
}

impl CoreCall {
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::AddOperator { .. } => "add_operator",
            Self::AddAuto { .. } => "add_auto",
            Self::AddTrashCat { .. } => "add_trash_cat",
            Self::AddTrashType { .. } => "add_trash_type",
            Self::AddCarrier { .. } => "add_carrier",
        }
    }

    pub fn wserver_id(&self) -> RecordId {
        match self {
            Self::AddOperator { wserver_id, .. }
            | Self::AddAuto { wserver_id, .. }
            | Self::AddTrashCat { wserver_id, .. }
            | Self::AddTrashType { wserver_id, .. }
            | Self::AddCarrier { wserver_id, .. } => *wserver_id,
        }
    }
}

/// Credential pair sent once per connection before any call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreAuth {
    pub login: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_names_parse_back() {
        for op in CoreOperation::ALL {
            assert_eq!(op.as_str().parse::<CoreOperation>().unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_operation_is_rejected() {
        let err = "trash_cats".parse::<CoreOperation>().unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownOperation(name) if name == "trash_cats"));
    }

    #[test]
    fn test_call_wire_shape() {
        let call = CoreCall::AddTrashCat {
            name: "Plastic".to_string(),
            wserver_id: RecordId::new(7),
        };
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(
            value,
            json!({"method": "add_trash_cat", "args": {"name": "Plastic", "wserver_id": 7}})
        );
        assert_eq!(value["method"], call.method_name());
    }
}
