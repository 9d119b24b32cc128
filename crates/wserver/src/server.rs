//! RPC server loop.
//!
//! A ZMQ REP socket: one JSON request frame in, one JSON response frame out.
//! Requests are handled one at a time, to completion, before the reply.

use crate::operations::Registry;
use anyhow::{Context, Result};
use std::future::Future;
use tracing::{error, info, warn};
use wserver_protocol::{RpcRequest, RpcResponse};
use zeromq::{RepSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

pub struct WServer {
    socket: RepSocket,
    registry: Registry,
    bind_addr: String,
}

impl WServer {
    /// Bind the RPC socket.
    pub async fn bind(bind_addr: &str, registry: Registry) -> Result<Self> {
        let mut socket = RepSocket::new();
        socket
            .bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind RPC socket to {}", bind_addr))?;

        info!("WServer bound to {}", bind_addr);

        Ok(Self {
            socket,
            registry,
            bind_addr: bind_addr.to_string(),
        })
    }

    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    /// Serve until `shutdown` completes.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("WServer event loop started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("WServer received stop signal");
                    break;
                }
                received = self.socket.recv() => {
                    let message = match received {
                        Ok(message) => message,
                        Err(e) => {
                            error!("RPC recv error: {}", e);
                            continue;
                        }
                    };

                    let response = Self::handle_message(&self.registry, message).await;
                    let bytes = serde_json::to_vec(&response)
                        .context("Failed to serialize RPC response")?;
                    if let Err(e) = self.socket.send(ZmqMessage::from(bytes)).await {
                        error!("Failed to send RPC response: {}", e);
                    }
                }
            }
        }

        info!("WServer stopped");
        Ok(())
    }

    async fn handle_message(registry: &Registry, message: ZmqMessage) -> RpcResponse {
        let frames = message.into_vec();
        let Some(frame) = frames.first() else {
            return RpcResponse::error("Empty request");
        };
        if frames.len() > 1 {
            warn!(frames = frames.len(), "Extra request frames ignored");
        }

        match serde_json::from_slice::<RpcRequest>(frame) {
            Ok(request) => registry.handle(request).await,
            Err(e) => {
                warn!("Unparseable request: {}", e);
                RpcResponse::error(format!("Invalid request: {}", e))
            }
        }
    }
}
