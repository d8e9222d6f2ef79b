//! Middlewares for the HTTP server.
//!
//! This module exposes tower [layers](tower::Layer) and related utilities to configure the
//! axum/hyper HTTP server. The middlewares are registered as a layer on the
//! [`Router`](axum::Router) in [`HttpServer`](crate::services::server::HttpServer).

mod handle_panic;
mod trace;

pub use self::handle_panic::*;
pub use self::trace::*;
