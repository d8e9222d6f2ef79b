//! Helpers for testing the web server and services.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output is
//!    captured by the test runner. All logs emitted with [`ember_log`] will show up for test
//!    failures or when run with `--nocapture`.
//!  - Build upload bodies with [`JfrUpload`] and request paths with [`IngestQuery`] rather than
//!    writing multipart payloads by hand.
//!
//! # Example
//!
//! ```
//! use ember_test::{IngestQuery, JfrUpload};
//!
//! ember_test::setup();
//!
//! let upload = JfrUpload::new(b"recording");
//! let uri = IngestQuery::new("svc{env=prod}", 1000, 2000).to_uri();
//! assert_eq!(uri, "/ingest?from=1000&until=2000&name=svc%7Benv%3Dprod%7D&format=jfr");
//! assert!(upload.content_type().starts_with("multipart/form-data; boundary="));
//! ```

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

/// Boundary used for all multipart bodies built by this crate.
pub const BOUNDARY: &str = "ember-test-boundary";

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from this crate and mutes all other logs.
pub fn setup() {
    ember_log::init_test!();
}

/// Compresses `data` with gzip.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing into a `Vec` cannot fail.
    encoder.write_all(data).ok();
    encoder.finish().unwrap_or_default()
}

/// Builds a minimal Java Flight Recorder recording with `chunks` empty chunks.
///
/// Every chunk consists of a version 2 header followed by zero padding.
pub fn jfr_recording(chunks: usize) -> Vec<u8> {
    const CHUNK_SIZE: u64 = 128;
    const HEADER_SIZE: u64 = 68;

    let mut data = Vec::new();
    for index in 0..chunks {
        let start = data.len();
        data.extend_from_slice(b"FLR\0");
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&CHUNK_SIZE.to_be_bytes());
        data.extend_from_slice(&HEADER_SIZE.to_be_bytes());
        data.extend_from_slice(&HEADER_SIZE.to_be_bytes());
        data.extend_from_slice(&(index as u64 * 1_000_000_000).to_be_bytes());
        data.extend_from_slice(&1_000_000_000u64.to_be_bytes());
        data.resize(start + CHUNK_SIZE as usize, 0);
    }
    data
}

/// A single part of a multipart form body.
#[derive(Clone, Debug)]
pub struct Part {
    name: String,
    file_name: Option<String>,
    content: Vec<u8>,
}

impl Part {
    /// Creates a plain form field.
    pub fn field(name: &str, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.to_owned(),
            file_name: None,
            content: content.into(),
        }
    }

    /// Creates a file part.
    pub fn file(name: &str, file_name: &str, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.to_owned(),
            file_name: Some(file_name.to_owned()),
            content: content.into(),
        }
    }
}

/// Encodes the given parts as a `multipart/form-data` body using [`BOUNDARY`].
pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();

    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match &part.file_name {
            Some(file_name) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{file_name}\"\r\n\
                 Content-Type: application/octet-stream\r\n",
                part.name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part.content);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// The `Content-Type` header value matching [`multipart_body`].
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// A multipart upload of a gzip compressed recording, as sent by profiling agents.
#[derive(Clone, Debug)]
pub struct JfrUpload {
    parts: Vec<Part>,
}

impl JfrUpload {
    /// Compresses `recording` into a file part named `jfr` with file name `jfr`.
    pub fn new(recording: &[u8]) -> Self {
        Self::from_parts(vec![Part::file("jfr", "jfr", gzip(recording))])
    }

    /// Creates an upload from arbitrary parts.
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    /// Returns the `Content-Type` header value for this upload.
    pub fn content_type(&self) -> String {
        multipart_content_type()
    }

    /// Encodes the upload body.
    pub fn body(&self) -> Vec<u8> {
        multipart_body(&self.parts)
    }
}

/// Builder for the query string of an ingest request.
#[derive(Clone, Debug)]
pub struct IngestQuery {
    pairs: Vec<(String, String)>,
}

impl IngestQuery {
    /// Creates a query with `name`, `from`, `until` and `format=jfr`.
    pub fn new(name: &str, from: u64, until: u64) -> Self {
        Self::empty()
            .with("from", &from.to_string())
            .with("until", &until.to_string())
            .with("name", name)
            .with("format", "jfr")
    }

    /// Creates a query without any parameters.
    pub fn empty() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Appends a parameter.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.pairs.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Removes all values of a parameter.
    pub fn without(mut self, key: &str) -> Self {
        self.pairs.retain(|(k, _)| k != key);
        self
    }

    /// Replaces all values of a parameter.
    pub fn set(self, key: &str, value: &str) -> Self {
        self.without(key).with(key, value)
    }

    /// Encodes the query string without the leading `?`.
    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.pairs)
            .finish()
    }

    /// Returns the request path and query for the ingest endpoint.
    pub fn to_uri(&self) -> String {
        format!("/ingest?{}", self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_body() {
        let body = multipart_body(&[Part::field("a", "1"), Part::file("b", "c", "2")]);
        let body = String::from_utf8(body).unwrap();
        assert_eq!(
            body,
            "--ember-test-boundary\r\n\
             Content-Disposition: form-data; name=\"a\"\r\n\
             \r\n\
             1\r\n\
             --ember-test-boundary\r\n\
             Content-Disposition: form-data; name=\"b\"; filename=\"c\"\r\n\
             Content-Type: application/octet-stream\r\n\
             \r\n\
             2\r\n\
             --ember-test-boundary--\r\n"
        );
    }

    #[test]
    fn test_query_set() {
        let query = IngestQuery::new("svc", 1, 2).set("format", "pprof");
        assert_eq!(query.encode(), "from=1&until=2&name=svc&format=pprof");
    }

    #[test]
    fn test_jfr_recording() {
        let data = jfr_recording(2);
        assert_eq!(data.len(), 256);
        assert_eq!(&data[128..132], b"FLR\0");
    }
}
