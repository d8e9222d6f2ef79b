//! Profile data model and format handling for Ember.
//!
//! An uploaded profile goes through two stages before it can be turned into telemetry records:
//!
//!  1. The compressed upload is streamed through a [`Decoder`] into a caller-owned buffer. The
//!     decoder enforces a hard limit on the decompressed size.
//!  2. The decompressed buffer is handed to the [`Parser`] registered for the upload's `format` in
//!     a [`ParserRegistry`], which returns zero or more [`ProfileRecord`]s.
//!
//! ```
//! use bytes::BytesMut;
//! use ember_profiling::{Decoder, Metadata, ParserRegistry};
//!
//! # let compressed: &[u8] = &[
//! #     0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x03, 0x00, 0x00, 0x00, 0x00,
//! #     0x00, 0x00, 0x00, 0x00, 0x00,
//! # ];
//! let mut buffer = BytesMut::new();
//! let mut decoder = Decoder::new(&mut buffer, 1024);
//! decoder.decode(compressed).unwrap();
//! decoder.finish().unwrap();
//!
//! let registry = ParserRegistry::default();
//! let parser = registry.get("jfr").unwrap();
//! let records = parser.parse(&buffer, &Metadata::default()).unwrap();
//! assert!(records.is_empty());
//! ```
#![warn(missing_docs)]

mod decoder;
mod error;
mod jfr;
mod parser;
mod types;

pub use crate::decoder::*;
pub use crate::error::*;
pub use crate::jfr::*;
pub use crate::parser::*;
pub use crate::types::*;
