//! Remote dispatch to core nodes.
//!
//! One [`Dispatcher::dispatch`] call is one short-lived conversation with a
//! single node: connect, authenticate, make the typed call, read the reply.
//! The session is dropped on every path out of `dispatch`.

use crate::args::NamedArgs;
use crate::resolver::NodeResolver;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use wserver_protocol::{
    CoreAuth, CoreCall, CoreOperation, Message, OpCode, PolygonId, ProtocolError, RecordId,
    RemoteCallResult, RemoteOutcome,
};
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

#[derive(Debug, Error)]
pub enum CoreError {
    /// Refused, timed out, or never answered.
    #[error("Core node unreachable: {0}")]
    Unreachable(String),

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Call rejected: {0}")]
    Rejected(String),

    #[error("Unexpected reply opcode: {0:?}")]
    UnexpectedReply(OpCode),

    #[error("Cannot build {method} call: {reason}")]
    Conversion { method: &'static str, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl CoreError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, CoreError::Unreachable(_))
    }
}

impl From<CoreError> for RemoteOutcome {
    fn from(err: CoreError) -> Self {
        if err.is_unreachable() {
            RemoteOutcome::Missing
        } else {
            RemoteOutcome::Failed(err.to_string())
        }
    }
}

// ============================================================================
// Connection seam
// ============================================================================

/// Opens sessions to core nodes.
#[async_trait]
pub trait CoreConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn CoreSession>, CoreError>;
}

/// An open conversation with one core node.
#[async_trait]
pub trait CoreSession: Send {
    async fn authenticate(&mut self, auth: &CoreAuth) -> Result<(), CoreError>;

    async fn call(&mut self, request_id: RecordId, call: &CoreCall) -> Result<Value, CoreError>;
}

/// Connector speaking the framed protocol over a ZMQ REQ socket.
#[derive(Debug, Clone)]
pub struct ZmqCoreConnector {
    pub port: u16,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

#[async_trait]
impl CoreConnector for ZmqCoreConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn CoreSession>, CoreError> {
        let endpoint = format!("tcp://{}:{}", address, self.port);
        let mut socket = ReqSocket::new();

        match timeout(self.connect_timeout, socket.connect(&endpoint)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(CoreError::Unreachable(format!("{}: {}", endpoint, e))),
            Err(_) => {
                return Err(CoreError::Unreachable(format!(
                    "{}: connect timed out after {:?}",
                    endpoint, self.connect_timeout
                )))
            }
        }

        debug!(%endpoint, "Connected to core node");
        Ok(Box::new(ZmqCoreSession {
            socket,
            endpoint,
            request_timeout: self.request_timeout,
        }))
    }
}

struct ZmqCoreSession {
    socket: ReqSocket,
    endpoint: String,
    request_timeout: Duration,
}

impl ZmqCoreSession {
    /// Send one message and wait for its reply, both bounded by the request timeout.
    async fn exchange(&mut self, message: Message) -> Result<Message, CoreError> {
        let (header, body) = message.pack()?;
        let mut multipart = ZmqMessage::from(header);
        multipart.push_back(body.into());

        match timeout(self.request_timeout, self.socket.send(multipart)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(CoreError::Transport(e.to_string())),
            Err(_) => {
                return Err(CoreError::Unreachable(format!(
                    "{}: send timed out",
                    self.endpoint
                )))
            }
        }

        let reply = match timeout(self.request_timeout, self.socket.recv()).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(CoreError::Transport(e.to_string())),
            Err(_) => {
                return Err(CoreError::Unreachable(format!(
                    "{}: no reply within {:?}",
                    self.endpoint, self.request_timeout
                )))
            }
        };

        let frames: Vec<Vec<u8>> = reply.into_vec().into_iter().map(|b| b.to_vec()).collect();
        Ok(Message::unpack(&frames)?)
    }
}

/// Readable form of an `Err` reply payload.
fn error_text(reply: &Message) -> String {
    match reply.decode::<Value>() {
        Ok(Value::String(text)) => text,
        Ok(other) => other.to_string(),
        Err(_) => String::from_utf8_lossy(&reply.payload).into_owned(),
    }
}

#[async_trait]
impl CoreSession for ZmqCoreSession {
    async fn authenticate(&mut self, auth: &CoreAuth) -> Result<(), CoreError> {
        let reply = self.exchange(Message::json(OpCode::Auth, 0, auth)?).await?;
        match reply.header.opcode {
            OpCode::Reply => Ok(()),
            OpCode::Err => Err(CoreError::AuthRejected(error_text(&reply))),
            other => Err(CoreError::UnexpectedReply(other)),
        }
    }

    async fn call(&mut self, request_id: RecordId, call: &CoreCall) -> Result<Value, CoreError> {
        let message = Message::json(OpCode::Call, request_id.as_u64(), call)?;
        let reply = self.exchange(message).await?;
        match reply.header.opcode {
            OpCode::Reply => Ok(reply.decode()?),
            OpCode::Err => Err(CoreError::Rejected(error_text(&reply))),
            other => Err(CoreError::UnexpectedReply(other)),
        }
    }
}

// ============================================================================
// Adapter table
// ============================================================================

/// How one operation becomes a typed core call.
#[derive(Debug)]
pub struct Adapter {
    pub operation: CoreOperation,
    pub method: &'static str,
    /// Argument names copied into the call, besides `wserver_id`.
    pub reads: &'static [&'static str],
}

pub static ADAPTERS: [Adapter; 5] = [
    Adapter {
        operation: CoreOperation::Operator,
        method: "add_operator",
        reads: &["full_name", "login", "password"],
    },
    Adapter {
        operation: CoreOperation::Auto,
        method: "add_auto",
        reads: &["car_number", "model", "rfid_id", "id_type", "rg_weight"],
    },
    Adapter {
        operation: CoreOperation::TrashCat,
        method: "add_trash_cat",
        reads: &["name"],
    },
    Adapter {
        operation: CoreOperation::TrashType,
        method: "add_trash_type",
        reads: &["name", "category"],
    },
    Adapter {
        operation: CoreOperation::Company,
        method: "add_carrier",
        reads: &["name", "inn", "kpp", "ex_id", "status", "active"],
    },
];

pub fn adapter(operation: CoreOperation) -> &'static Adapter {
    match operation {
        CoreOperation::Operator => &ADAPTERS[0],
        CoreOperation::Auto => &ADAPTERS[1],
        CoreOperation::TrashCat => &ADAPTERS[2],
        CoreOperation::TrashType => &ADAPTERS[3],
        CoreOperation::Company => &ADAPTERS[4],
    }
}

/// Argument names the adapter for `operation` reads.
pub fn required_fields(operation: CoreOperation) -> &'static [&'static str] {
    adapter(operation).reads
}

/// Translate collected arguments into the typed call for `operation`.
pub fn build_call(
    operation: CoreOperation,
    wserver_id: RecordId,
    args: &NamedArgs,
) -> Result<CoreCall, CoreError> {
    let adapter = adapter(operation);

    let mut call_args = Map::new();
    for &field in adapter.reads {
        let value = args.get(field).cloned().unwrap_or(Value::Null);
        call_args.insert(field.to_string(), value);
    }
    call_args.insert("wserver_id".to_string(), Value::from(wserver_id.get()));

    let mut envelope = Map::new();
    envelope.insert("method".to_string(), Value::from(adapter.method));
    envelope.insert("args".to_string(), Value::Object(call_args));

    serde_json::from_value(Value::Object(envelope)).map_err(|e| CoreError::Conversion {
        method: adapter.method,
        reason: e.to_string(),
    })
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct Dispatcher {
    resolver: NodeResolver,
    connector: Arc<dyn CoreConnector>,
    auth: CoreAuth,
}

impl Dispatcher {
    pub fn new(resolver: NodeResolver, connector: Arc<dyn CoreConnector>, auth: CoreAuth) -> Self {
        Self {
            resolver,
            connector,
            auth,
        }
    }

    pub fn resolver(&self) -> &NodeResolver {
        &self.resolver
    }

    /// Deliver one newly written record to one polygon.
    pub async fn dispatch(
        &self,
        destination: PolygonId,
        operation: CoreOperation,
        local_id: RecordId,
        args: &NamedArgs,
    ) -> RemoteCallResult {
        let Some(address) = self.resolver.resolve_address(destination).await else {
            info!(polygon = %destination, %operation, "No address on record; skipping");
            return RemoteCallResult::missing(destination);
        };

        let result = match self.deliver(&address, operation, local_id, args).await {
            Ok(reply) => {
                info!(polygon = %destination, %address, %operation, id = %local_id, "Delivered to core node");
                RemoteOutcome::Delivered(reply)
            }
            Err(e) => {
                warn!(polygon = %destination, %address, %operation, id = %local_id, error = %e, "Core dispatch did not complete");
                e.into()
            }
        };

        RemoteCallResult {
            destination,
            result,
        }
    }

    async fn deliver(
        &self,
        address: &str,
        operation: CoreOperation,
        local_id: RecordId,
        args: &NamedArgs,
    ) -> Result<Value, CoreError> {
        let call = build_call(operation, local_id, args)?;
        let mut session = self.connector.connect(address).await?;
        session.authenticate(&self.auth).await?;
        session.call(local_id, &call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> NamedArgs {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_adapter_table_is_keyed_by_operation() {
        for op in CoreOperation::ALL {
            assert_eq!(adapter(op).operation, op);
        }
    }

    #[test]
    fn test_build_auto_call() {
        let call = build_call(
            CoreOperation::Auto,
            RecordId::new(42),
            &args(json!({
                "car_number": "A123BC", "polygon": 9, "id_type": "rfid",
                "rg_weight": 0, "model": 3, "rfid_id": null
            })),
        )
        .unwrap();

        assert_eq!(
            call,
            CoreCall::AddAuto {
                car_number: "A123BC".to_string(),
                wserver_id: RecordId::new(42),
                model: Some(3),
                rfid_id: None,
                id_type: Some("rfid".to_string()),
                rg_weight: Some(0),
            }
        );
    }

    #[test]
    fn test_company_maps_active_and_status() {
        let call = build_call(
            CoreOperation::Company,
            RecordId::new(5),
            &args(json!({"name": "EcoTrans", "inn": "7701", "status": true, "active": false})),
        )
        .unwrap();

        match call {
            CoreCall::AddCarrier {
                status, active, kpp, wserver_id, ..
            } => {
                assert_eq!(status, Some(true));
                assert_eq!(active, Some(false));
                assert_eq!(kpp, None);
                assert_eq!(wserver_id, RecordId::new(5));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_trash_type_reads_category() {
        let call = build_call(
            CoreOperation::TrashType,
            RecordId::new(8),
            &args(json!({"name": "Glass", "category": 2})),
        )
        .unwrap();
        assert_eq!(
            call,
            CoreCall::AddTrashType {
                name: "Glass".to_string(),
                wserver_id: RecordId::new(8),
                category: Some(2),
            }
        );
    }

    #[test]
    fn test_unconvertible_args_are_a_conversion_error() {
        let err = build_call(CoreOperation::Operator, RecordId::new(1), &args(json!({"login": "x"})))
            .unwrap_err();
        assert!(matches!(err, CoreError::Conversion { method: "add_operator", .. }));
        assert!(matches!(RemoteOutcome::from(err), RemoteOutcome::Failed(_)));
    }

    #[test]
    fn test_unreachable_maps_to_missing() {
        let outcome = RemoteOutcome::from(CoreError::Unreachable("timed out".into()));
        assert!(outcome.is_missing());
    }

    #[tokio::test]
    async fn test_zmq_connector_times_out_on_dead_port() {
        let connector = ZmqCoreConnector {
            port: 1,
            connect_timeout: Duration::from_millis(200),
            request_timeout: Duration::from_millis(200),
        };
        let err = match connector.connect("127.0.0.1").await {
            Ok(_) => panic!("connect to a dead port should not succeed"),
            Err(e) => e,
        };
        assert!(err.is_unreachable());
    }
}
