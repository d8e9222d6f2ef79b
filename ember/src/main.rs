//! Ember is an ingest server for Java Flight Recorder profiles.
//!
//! It accepts uploads from Pyroscope-compatible profiling agents, validates and decompresses them,
//! splits each recording into profiles and forwards the result as a batch of records to a
//! downstream pipeline.
//!
//! # Workspace Crates
//!
//! Ember is split into the following workspace crates:
//!
//!  - `ember`: Main entry point and command line interface.
//!  - [`ember-config`]: Static configuration for the CLI and server.
//!  - [`ember-log`]: Logging facade and subscriber setup.
//!  - [`ember-profiling`]: Profile data model, parsers and the gzip decoder.
//!  - [`ember-server`]: Endpoints and services.
//!  - [`ember-statsd`]: High-level StatsD metric client for internal measurements.
//!  - [`ember-test`]: Helpers for building upload requests in tests.
//!
//! [`ember-config`]: ../ember_config/index.html
//! [`ember-log`]: ../ember_log/index.html
//! [`ember-profiling`]: ../ember_profiling/index.html
//! [`ember-server`]: ../ember_server/index.html
//! [`ember-statsd`]: ../ember_statsd/index.html
//! [`ember-test`]: ../ember_test/index.html

mod cli;
mod cliapp;
mod setup;
mod upload;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            ember_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
