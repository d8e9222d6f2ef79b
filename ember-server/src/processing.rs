//! Assembly of parsed profiles into output records.

use bytes::Bytes;
use data_encoding::BASE64;
use ember_profiling::{PayloadType, ProfileRecord, ProfileType};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::utils::ValidatedParams;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Attributes of an [`OutputRecord`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RecordAttributes {
    /// Length of the profiled window in nanoseconds, rendered as a decimal string.
    pub duration_ns: String,
    /// The application name.
    pub service_name: String,
    /// Labels of the upload. Later duplicates overwrite earlier values.
    pub tags: IndexMap<String, String>,
    /// Describes the samples in the body.
    #[serde(flatten)]
    pub profile_type: ProfileType,
    /// The encoding of the body.
    pub payload_type: PayloadType,
}

/// A single profile handed to the downstream consumer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OutputRecord {
    /// Start of the profiled window in nanoseconds since the UNIX epoch.
    pub timestamp: u64,
    /// Metadata of the profile.
    pub attributes: RecordAttributes,
    /// The raw profile payload. Serialized as base64.
    #[serde(serialize_with = "serialize_base64")]
    pub body: Bytes,
}

fn serialize_base64<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&BASE64.encode(bytes))
}

/// All output records of a single request.
///
/// A batch is delivered to the consumer as a whole.
#[derive(Clone, Debug, Serialize)]
pub struct RecordBatch {
    /// Identifier of the request that produced this batch.
    pub request_id: Uuid,
    /// Records in the order the parser returned them.
    pub records: Vec<OutputRecord>,
}

impl RecordBatch {
    /// Returns `true` if the batch contains no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total size of all record bodies in bytes.
    pub fn payload_size(&self) -> usize {
        self.records.iter().map(|record| record.body.len()).sum()
    }
}

/// Builds one [`OutputRecord`] per parsed profile.
///
/// An `end` before `start` wraps around instead of failing, which yields a very large duration.
pub fn assemble(
    request_id: Uuid,
    params: &ValidatedParams,
    profiles: Vec<ProfileRecord>,
) -> RecordBatch {
    if params.end < params.start {
        ember_log::warn!(
            service = params.name.as_str(),
            start = params.start,
            end = params.end,
            "profile window ends before it starts",
        );
    }

    let timestamp = params.start.wrapping_mul(NANOS_PER_SECOND);
    let duration_ns = params
        .end
        .wrapping_sub(params.start)
        .wrapping_mul(NANOS_PER_SECOND)
        .to_string();

    let tags: IndexMap<String, String> = params.labels.iter().cloned().collect();

    let records = profiles
        .into_iter()
        .map(|profile| OutputRecord {
            timestamp,
            attributes: RecordAttributes {
                duration_ns: duration_ns.clone(),
                service_name: params.name.clone(),
                tags: tags.clone(),
                profile_type: profile.profile_type,
                payload_type: profile.payload_type,
            },
            body: profile.payload,
        })
        .collect();

    RecordBatch {
        request_id,
        records,
    }
}
