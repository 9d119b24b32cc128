//! WServer: weighing record server.
//!
//! Accepts RPC writes into GDB and pushes newly created reference records
//! (vehicles, carriers, trash categories and types, operators) to the core
//! nodes of the polygons that need them.

pub mod config;
pub mod error;
pub mod operations;
pub mod photos;
pub mod server;

pub use config::{CoreConfig, WServerConfig};
pub use error::{ConfigError, PhotoError};
pub use operations::Registry;
pub use photos::PhotoStore;
pub use server::WServer;
