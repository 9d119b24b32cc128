//! Write stages and the propagation layer.
//!
//! A method is composed as `Propagate::layer(LocalWrite)`: the local write
//! always runs first, and only a committed write is fanned out. Remote results
//! are attached to the report; they never change the local outcome.

use crate::args::{NamedArgs, ParamSchema};
use crate::dispatch::{required_fields, Dispatcher};
use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use wserver_protocol::defaults::DESTINATION_PARAM;
use wserver_protocol::{
    CoreOperation, PolygonId, ProtocolError, RecordId, RemoteCallResult, WriteOutcome, WriteReport,
};

/// One step of a write pipeline.
#[async_trait]
pub trait WriteStage: Send + Sync {
    async fn run(&self, args: &NamedArgs) -> WriteReport;
}

#[async_trait]
impl<S: WriteStage + ?Sized> WriteStage for Box<S> {
    async fn run(&self, args: &NamedArgs) -> WriteReport {
        (**self).run(args).await
    }
}

type WriteFn = Box<dyn Fn(NamedArgs) -> BoxFuture<'static, WriteOutcome> + Send + Sync>;

/// The innermost stage: a single local database write.
pub struct LocalWrite {
    write: WriteFn,
}

impl LocalWrite {
    pub fn new<F, Fut>(write: F) -> Self
    where
        F: Fn(NamedArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WriteOutcome> + Send + 'static,
    {
        Self {
            write: Box::new(move |args| Box::pin(write(args))),
        }
    }
}

#[async_trait]
impl WriteStage for LocalWrite {
    async fn run(&self, args: &NamedArgs) -> WriteReport {
        WriteReport::local((self.write)(args.clone()).await)
    }
}

/// How the destinations of one write are contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanoutMode {
    /// One destination after another.
    Sequential,
    /// All destinations at once, joined before replying.
    #[default]
    Concurrent,
}

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error(transparent)]
    UnknownOperation(#[from] ProtocolError),

    #[error("{operation} propagation reads '{field}', which the method does not declare")]
    UndeclaredField {
        operation: CoreOperation,
        field: &'static str,
    },
}

/// Propagation of committed writes to core nodes.
pub struct Propagate {
    operation: CoreOperation,
    dispatcher: Arc<Dispatcher>,
    mode: FanoutMode,
}

impl Propagate {
    /// Check that `schema` supplies everything `operation` needs.
    pub fn new(
        operation: CoreOperation,
        schema: &ParamSchema,
        dispatcher: Arc<Dispatcher>,
        mode: FanoutMode,
    ) -> Result<Self, CompositionError> {
        if let Some(&field) = required_fields(operation)
            .iter()
            .find(|field| !schema.declares(field))
        {
            return Err(CompositionError::UndeclaredField { operation, field });
        }

        Ok(Self {
            operation,
            dispatcher,
            mode,
        })
    }

    /// Same as [`Propagate::new`], with the operation given by its wire name.
    pub fn named(
        operation: &str,
        schema: &ParamSchema,
        dispatcher: Arc<Dispatcher>,
        mode: FanoutMode,
    ) -> Result<Self, CompositionError> {
        Self::new(operation.parse()?, schema, dispatcher, mode)
    }

    pub fn operation(&self) -> CoreOperation {
        self.operation
    }

    /// Wrap `inner` so its committed writes are propagated.
    pub fn layer(self, inner: impl WriteStage + 'static) -> Propagated {
        Propagated {
            inner: Box::new(inner),
            propagate: self,
        }
    }

    async fn fan_out(&self, local_id: RecordId, args: &NamedArgs) -> Vec<RemoteCallResult> {
        let destinations = match destination_selector(args) {
            Ok(explicit) => {
                self.dispatcher
                    .resolver()
                    .resolve_destinations(explicit)
                    .await
            }
            Err(raw) => {
                warn!(operation = %self.operation, polygon = %raw, "Unusable destination selector; not propagating");
                Vec::new()
            }
        };

        debug!(
            operation = %self.operation,
            id = %local_id,
            destinations = destinations.len(),
            mode = ?self.mode,
            "Propagating write"
        );

        match self.mode {
            FanoutMode::Sequential => {
                let mut results = Vec::with_capacity(destinations.len());
                for destination in destinations {
                    results.push(
                        self.dispatcher
                            .dispatch(destination, self.operation, local_id, args)
                            .await,
                    );
                }
                results
            }
            FanoutMode::Concurrent => {
                join_all(destinations.into_iter().map(|destination| {
                    self.dispatcher
                        .dispatch(destination, self.operation, local_id, args)
                }))
                .await
            }
        }
    }
}

/// `null`, absent or `0` means broadcast. Anything that is not an id is returned as `Err`.
fn destination_selector(args: &NamedArgs) -> Result<Option<PolygonId>, Value> {
    match args.get(DESTINATION_PARAM) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(None),
            Some(id) => Ok(Some(PolygonId::new(id))),
            None => Err(Value::Number(n.clone())),
        },
        Some(other) => Err(other.clone()),
    }
}

/// A stage wrapped by [`Propagate::layer`].
pub struct Propagated {
    inner: Box<dyn WriteStage>,
    propagate: Propagate,
}

#[async_trait]
impl WriteStage for Propagated {
    async fn run(&self, args: &NamedArgs) -> WriteReport {
        let mut report = self.inner.run(args).await;
        let Some(local_id) = report.outcome.record_id() else {
            return report;
        };
        report.ar_response = Some(self.propagate.fan_out(local_id, args).await);
        report
    }
}
