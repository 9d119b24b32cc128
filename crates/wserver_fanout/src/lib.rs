//! Write-through fan-out of GDB records to core nodes.
//!
//! Flow of one propagating RPC call:
//!
//! ```text
//! request -> args::collect -> LocalWrite (GDB) -> [Success] NodeResolver
//!         -> Dispatcher (one call per polygon) -> WriteReport { outcome, ar_response }
//! ```
//!
//! Remote delivery is best-effort and strictly post-commit: whatever happens
//! on the core side is reported in `ar_response` and never alters the local
//! outcome.

pub mod args;
pub mod dispatch;
pub mod orchestrator;
pub mod resolver;

pub use args::{collect, ArgsError, NamedArgs, ParamSchema, ParamSpec};
pub use dispatch::{
    build_call, required_fields, CoreConnector, CoreError, CoreSession, Dispatcher,
    ZmqCoreConnector,
};
pub use orchestrator::{CompositionError, FanoutMode, LocalWrite, Propagate, Propagated, WriteStage};
pub use resolver::{Destination, Directory, NodeResolver};
