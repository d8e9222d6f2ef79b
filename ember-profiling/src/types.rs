use std::fmt;

use bytes::Bytes;
use serde::{Serialize, Serializer};

/// Additional information about an upload that is passed into the [`Parser`](crate::Parser).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Metadata {
    /// The sampling frequency in Hz, or `0` to use the default rate of the format.
    pub sample_rate_hertz: u64,
}

/// The encoding of a [`ProfileRecord`]'s payload.
///
/// Renders as its numeric discriminant, which is what downstream consumers store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PayloadType {
    /// A gzip compressed or plain `profile.proto` message.
    Pprof = 0,
    /// A Java Flight Recorder recording.
    Jfr = 1,
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

impl Serialize for PayloadType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Describes the samples contained in a [`ProfileRecord`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ProfileType {
    /// The profile type, for example `cpu` or `memory`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Names of the sample values, for example `samples` or `alloc_space`.
    pub sample_types: Vec<String>,
    /// Units of the sample values, positionally matching `sample_types`.
    pub sample_units: Vec<String>,
    /// The kind of events between sampled occurrences.
    pub period_type: String,
    /// The unit of the sampling period.
    pub period_unit: String,
}

/// A single profile produced by a [`Parser`](crate::Parser).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProfileRecord {
    /// The raw sample payload.
    pub payload: Bytes,
    /// The encoding of the payload.
    pub payload_type: PayloadType,
    /// Metadata describing the samples in the payload.
    pub profile_type: ProfileType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_type_display() {
        assert_eq!(PayloadType::Pprof.to_string(), "0");
        assert_eq!(PayloadType::Jfr.to_string(), "1");
        assert_eq!(serde_json::to_string(&PayloadType::Jfr).unwrap(), "\"1\"");
    }

    #[test]
    fn test_profile_type_serialize() {
        let profile_type = ProfileType {
            kind: "cpu".to_owned(),
            sample_types: vec!["samples".to_owned()],
            sample_units: vec!["count".to_owned()],
            period_type: "cpu".to_owned(),
            period_unit: "ns".to_owned(),
        };

        assert_eq!(
            serde_json::to_string(&profile_type).unwrap(),
            r#"{"type":"cpu","sample_types":["samples"],"sample_units":["count"],"period_type":"cpu","period_unit":"ns"}"#
        );
    }
}
