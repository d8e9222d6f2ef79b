//! Services backing the HTTP server.
//!
//! - [`server`] binds the listener and serves the endpoints until shutdown.
//! - [`consumer`] delivers assembled record batches downstream.

pub mod consumer;
pub mod server;
