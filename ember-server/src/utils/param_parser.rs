use std::borrow::Cow;
use std::num::ParseIntError;
use std::str::FromStr;

use ember_profiling::Metadata;

/// An error returned when parsing the `name` parameter of an upload.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum LabelError {
    /// The application name before the label block is empty.
    #[error("application name is empty")]
    EmptyName,
    /// The label block is opened but not closed at the end of the value.
    #[error("label block is not terminated with '}}'")]
    Unterminated,
    /// The label block does not consist of `key=value` pairs.
    #[error("expected key value pairs, got {0} fields")]
    UnpairedFields(usize),
}

/// An error returned when validating the query string of an upload.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("required start time is missing")]
    MissingStart,
    #[error("failed to parse start time: {0}")]
    InvalidStart(#[source] ParseIntError),
    #[error("required labels are missing")]
    MissingName,
    #[error("failed to compile labels: {0}")]
    InvalidLabels(#[from] LabelError),
    #[error("required end time is missing")]
    MissingEnd,
    #[error("failed to parse end time: {0}")]
    InvalidEnd(#[source] ParseIntError),
    #[error("failed to parse rate: {0}")]
    InvalidSampleRate(#[source] ParseIntError),
}

/// The application name and labels of an upload.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LabelSet {
    /// The application name.
    pub name: String,
    /// Labels in the order they were given, including duplicates.
    pub labels: Vec<(String, String)>,
}

impl LabelSet {
    /// Parses an expression of the form `name{key=value,key=value}`.
    ///
    /// The label block is optional and may be empty. Its contents are split on `=` and `,`, empty
    /// fields are skipped, and the remaining fields are paired up in order.
    pub fn parse(expression: &str) -> Result<Self, LabelError> {
        let (name, block) = match expression.split_once('{') {
            Some((name, rest)) => {
                let block = rest.strip_suffix('}').ok_or(LabelError::Unterminated)?;
                (name, Some(block))
            }
            None => (expression, None),
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(LabelError::EmptyName);
        }

        let mut labels = Vec::new();
        if let Some(block) = block.filter(|b| !b.is_empty()) {
            let fields: Vec<&str> = block
                .split(['=', ','])
                .filter(|field| !field.is_empty())
                .collect();

            if fields.is_empty() || fields.len() % 2 != 0 {
                return Err(LabelError::UnpairedFields(fields.len()));
            }

            labels = fields
                .chunks_exact(2)
                .map(|pair| (pair[0].to_owned(), pair[1].to_owned()))
                .collect();
        }

        Ok(Self {
            name: name.to_owned(),
            labels,
        })
    }
}

/// The validated time window, application name and labels of an upload.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidatedParams {
    /// Start of the profiled window in seconds since the UNIX epoch.
    pub start: u64,
    /// End of the profiled window in seconds since the UNIX epoch.
    pub end: u64,
    /// The application name.
    pub name: String,
    /// Labels of the upload in source order.
    pub labels: Vec<(String, String)>,
}

/// All parameters of an ingest request's query string.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IngestQuery {
    /// The required parameters.
    pub params: ValidatedParams,
    /// Parser metadata, currently the optional `sampleRate`.
    pub metadata: Metadata,
    /// The requested input format, if any.
    pub format: Option<String>,
}

impl IngestQuery {
    /// Validates a URL-encoded query string.
    ///
    /// Parameters are checked in the order `from`, `name`, `until`, `sampleRate`. When a key is
    /// given multiple times, the first value is used.
    pub fn parse(query: Option<&str>) -> Result<Self, ParamError> {
        let pairs: Vec<(Cow<'_, str>, Cow<'_, str>)> =
            url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()).collect();

        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| &**v)
        };

        let start: u64 = get("from")
            .ok_or(ParamError::MissingStart)
            .map(parse_unsigned)?
            .map_err(ParamError::InvalidStart)?;

        let expression = get("name").ok_or(ParamError::MissingName)?;
        let LabelSet { name, labels } = LabelSet::parse(expression)?;

        let end: u64 = get("until")
            .ok_or(ParamError::MissingEnd)
            .map(parse_unsigned)?
            .map_err(ParamError::InvalidEnd)?;

        let sample_rate_hertz = match get("sampleRate") {
            Some(rate) => parse_unsigned(rate).map_err(ParamError::InvalidSampleRate)?,
            None => 0,
        };

        Ok(Self {
            params: ValidatedParams {
                start,
                end,
                name,
                labels,
            },
            metadata: Metadata { sample_rate_hertz },
            format: get("format").map(str::to_owned),
        })
    }
}

/// Parses an unsigned decimal integer consisting of ASCII digits only.
///
/// `str::parse` accepts a leading `+`, which is reported as an invalid digit here.
fn parse_unsigned<T>(value: &str) -> Result<T, ParseIntError>
where
    T: FromStr<Err = ParseIntError>,
{
    match value.strip_prefix('+') {
        Some(_) => "-".parse(),
        None => value.parse(),
    }
}
