//! Configuration for the Ember CLI and server.
#![warn(missing_docs)]

mod byte_size;
mod config;

pub use crate::byte_size::*;
pub use crate::config::*;
