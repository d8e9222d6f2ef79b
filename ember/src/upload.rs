//! Client for uploading recordings to a running server.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgMatches;
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};
use url::Url;

/// The format and multipart field name of JFR uploads.
const FORMAT: &str = "jfr";

/// Parameters of a single upload.
#[derive(Debug)]
pub struct Upload {
    pub base: Url,
    pub file: PathBuf,
    pub name: String,
    pub from: u64,
    pub until: u64,
    pub sample_rate: Option<u32>,
}

impl Upload {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let required = |id: &str| anyhow::anyhow!("`{id}` is required");

        Ok(Self {
            base: matches
                .get_one::<Url>("url")
                .cloned()
                .ok_or_else(|| required("url"))?,
            file: matches
                .get_one::<PathBuf>("file")
                .cloned()
                .ok_or_else(|| required("file"))?,
            name: matches
                .get_one::<String>("name")
                .cloned()
                .ok_or_else(|| required("name"))?,
            from: matches
                .get_one::<u64>("from")
                .copied()
                .ok_or_else(|| required("from"))?,
            until: matches
                .get_one::<u64>("until")
                .copied()
                .ok_or_else(|| required("until"))?,
            sample_rate: matches.get_one::<u32>("sample_rate").copied(),
        })
    }

    /// Returns the URL of the ingest endpoint including the query string.
    pub fn ingest_url(&self) -> Result<Url> {
        let mut url = self
            .base
            .join("ingest")
            .context("invalid server url")?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("from", &self.from.to_string())
                .append_pair("until", &self.until.to_string())
                .append_pair("name", &self.name)
                .append_pair("format", FORMAT);
            if let Some(sample_rate) = self.sample_rate {
                query.append_pair("sampleRate", &sample_rate.to_string());
            }
        }

        Ok(url)
    }
}

/// Gzip-compresses a payload with the default compression level.
pub fn compress(payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    Ok(encoder.finish()?)
}

/// Sends the recording and returns the response body on success.
pub fn upload(upload: &Upload) -> Result<String> {
    let recording = fs::read(&upload.file)
        .with_context(|| format!("failed to read {}", upload.file.display()))?;
    let compressed = compress(&recording).context("failed to compress the recording")?;

    let url = upload.ingest_url()?;
    ember_log::info!(
        "uploading {} bytes ({} compressed) to {url}",
        recording.len(),
        compressed.len(),
    );

    let part = Part::bytes(compressed).file_name(FORMAT);
    let form = Form::new().part(FORMAT, part);

    let response = Client::builder()
        .user_agent(concat!("ember/", env!("CARGO_PKG_VERSION")))
        .build()?
        .post(url)
        .multipart(form)
        .send()
        .context("failed to send the upload")?;

    let status = response.status();
    let body = response.text().unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("upload rejected with {status}: {}", body.trim());
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    fn upload(base: &str) -> Upload {
        Upload {
            base: base.parse().unwrap(),
            file: PathBuf::from("profile.jfr"),
            name: "svc{env=prod}".to_owned(),
            from: 1000,
            until: 2000,
            sample_rate: None,
        }
    }

    #[test]
    fn test_ingest_url() {
        let url = upload("http://127.0.0.1:8062/").ingest_url().unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8062/ingest?from=1000&until=2000&name=svc%7Benv%3Dprod%7D&format=jfr"
        );
    }

    #[test]
    fn test_ingest_url_sample_rate() {
        let mut upload = upload("http://localhost:8062");
        upload.sample_rate = Some(100);

        let url = upload.ingest_url().unwrap();
        assert_eq!(url.path(), "/ingest");
        assert!(url.as_str().ends_with("&format=jfr&sampleRate=100"));
    }

    #[test]
    fn test_compress() {
        let recording = ember_test::jfr_recording(1);
        let compressed = compress(&recording).unwrap();

        let mut decompressed = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decompressed)
            .unwrap();
        assert_eq!(decompressed, recording);
    }
}
