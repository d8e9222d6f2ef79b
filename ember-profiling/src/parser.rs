use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::{JfrParser, Metadata, ParseError, ProfileRecord};

/// Turns a decompressed upload into profile records.
///
/// Implementations are registered per input format in a [`ParserRegistry`]. Returning an empty
/// list is valid and means the upload contained no samples.
pub trait Parser: Send + Sync {
    /// Parses a decompressed payload.
    fn parse(&self, payload: &[u8], metadata: &Metadata) -> Result<Vec<ProfileRecord>, ParseError>;
}

impl<F> Parser for F
where
    F: Fn(&[u8], &Metadata) -> Result<Vec<ProfileRecord>, ParseError> + Send + Sync,
{
    fn parse(&self, payload: &[u8], metadata: &Metadata) -> Result<Vec<ProfileRecord>, ParseError> {
        self(payload, metadata)
    }
}

/// Parsers by the name of the format they accept.
///
/// The default registry supports `jfr`.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: BTreeMap<String, Arc<dyn Parser>>,
}

impl ParserRegistry {
    /// Creates a registry without any parsers.
    pub fn empty() -> Self {
        Self {
            parsers: BTreeMap::new(),
        }
    }

    /// Registers a parser for the given format, replacing any previous one.
    pub fn register(&mut self, format: impl Into<String>, parser: impl Parser + 'static) {
        self.parsers.insert(format.into(), Arc::new(parser));
    }

    /// Returns the parser for the given format.
    pub fn get(&self, format: &str) -> Option<Arc<dyn Parser>> {
        self.parsers.get(format).cloned()
    }

    /// Returns the names of all supported formats in sorted order.
    pub fn supported(&self) -> impl Iterator<Item = &str> {
        self.parsers.keys().map(String::as_str)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("jfr", JfrParser);
        registry
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.parsers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::{PayloadType, ProfileType};

    #[test]
    fn test_default_registry() {
        let registry = ParserRegistry::default();
        assert!(registry.get("jfr").is_some());
        assert!(registry.get("pprof").is_none());
        assert_eq!(registry.supported().collect::<Vec<_>>(), ["jfr"]);
    }

    #[test]
    fn test_register_closure() {
        let mut registry = ParserRegistry::default();
        registry.register("raw", |payload: &[u8], _: &Metadata| -> Result<_, ParseError> {
            Ok(vec![ProfileRecord {
                payload: Bytes::copy_from_slice(payload),
                payload_type: PayloadType::Pprof,
                profile_type: ProfileType::default(),
            }])
        });

        assert_eq!(registry.supported().collect::<Vec<_>>(), ["jfr", "raw"]);

        let parser = registry.get("raw").unwrap();
        let records = parser.parse(b"abc", &Metadata::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0].payload[..], b"abc");
    }
}
