//! Path-prefix classification and decoding of store bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::MirrorSettings;
use crate::model::{BackendSet, ListenerSet};

/// A cached store value.
///
/// Instances are immutable once cached; a change replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Opaque(String),
    Listener(ListenerSet),
    Backend(BackendSet),
}

impl DecodedValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DecodedValue::Opaque(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_listener_set(&self) -> Option<&ListenerSet> {
        match self {
            DecodedValue::Listener(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_backend_set(&self) -> Option<&BackendSet> {
        match self {
            DecodedValue::Backend(set) => Some(set),
            _ => None,
        }
    }

    /// Text form: opaque values verbatim, typed records as JSON.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        match self {
            DecodedValue::Opaque(value) => Ok(value.clone()),
            typed => serde_json::to_string(typed),
        }
    }
}

/// Classifies paths by literal prefix and decodes their bytes.
///
/// Prefix matching is plain string matching: `/cdsX` counts as under `/cds`.
#[derive(Debug, Clone)]
pub struct Decoder {
    listener_root: String,
    backend_root: String,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new("/lds", "/cds")
    }
}

impl Decoder {
    pub fn new(listener_root: impl Into<String>, backend_root: impl Into<String>) -> Self {
        Self {
            listener_root: listener_root.into(),
            backend_root: backend_root.into(),
        }
    }

    pub fn from_settings(settings: &MirrorSettings) -> Self {
        Self::new(&settings.listener_root, &settings.backend_root)
    }

    pub fn listener_root(&self) -> &str {
        &self.listener_root
    }

    pub fn backend_root(&self) -> &str {
        &self.backend_root
    }

    /// Decode `bytes` stored at `path`. Never fails.
    pub fn decode(&self, path: &str, bytes: &[u8]) -> DecodedValue {
        if path.starts_with(&self.listener_root) {
            DecodedValue::Listener(decode_record(path, bytes))
        } else if path.starts_with(&self.backend_root) {
            DecodedValue::Backend(decode_record(path, bytes))
        } else {
            DecodedValue::Opaque(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    /// Decode bytes as a backend set regardless of path.
    pub fn decode_backend_set(&self, path: &str, bytes: &[u8]) -> BackendSet {
        decode_record(path, bytes)
    }
}

/// Malformed input yields the zero value; the failure is only logged.
fn decode_record<T: DeserializeOwned + Default>(path: &str, bytes: &[u8]) -> T {
    match serde_json::from_slice(bytes) {
        Ok(record) => record,
        Err(e) => {
            tracing::debug!(path = %path, error = %e, "Undecodable record, using empty value");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_by_prefix() {
        let decoder = Decoder::default();

        let value = decoder.decode("/lds/api", br#"{"Name":"api"}"#);
        assert_eq!(value.as_listener_set().unwrap().name, "api");

        let value = decoder.decode("/cds/orders", br#"{"Name":"orders"}"#);
        assert_eq!(value.as_backend_set().unwrap().name, "orders");

        let value = decoder.decode("/config/feature", b"on");
        assert_eq!(value.as_str(), Some("on"));
    }

    #[test]
    fn test_prefix_match_is_literal() {
        let decoder = Decoder::default();
        // Not segment aware: "/cdsX" is treated as backend config.
        let value = decoder.decode("/cdsX/thing", b"plain text");
        assert_eq!(value, DecodedValue::Backend(BackendSet::default()));
    }

    #[test]
    fn test_malformed_bytes_yield_zero_records() {
        let decoder = Decoder::default();

        let listener = decoder.decode("/lds/api", b"{not json");
        assert_eq!(listener, DecodedValue::Listener(ListenerSet::default()));
        assert!(listener.as_listener_set().unwrap().listeners.is_empty());

        let backend = decoder.decode("/cds/orders", b"");
        assert_eq!(backend, DecodedValue::Backend(BackendSet::default()));
        assert!(backend.as_backend_set().unwrap().endpoints.is_empty());

        // Wrong shape for one field invalidates the whole record.
        let backend = decoder.decode("/cds/orders", br#"{"Name":"x","Endpoints":"oops"}"#);
        assert_eq!(backend.as_backend_set().unwrap().name, "");
    }

    #[test]
    fn test_text_form() {
        let decoder = Decoder::default();
        assert_eq!(
            decoder.decode("/service/a", b"value").to_text().unwrap(),
            "value"
        );

        let text = decoder
            .decode("/cds/orders", br#"{"Name":"orders"}"#)
            .to_text()
            .unwrap();
        assert!(text.contains(r#""Name":"orders""#));
    }

    #[test]
    fn test_non_utf8_opaque_is_lossy() {
        let decoder = Decoder::default();
        let value = decoder.decode("/config/blob", &[0x66, 0xff, 0x6f]);
        assert_eq!(value.as_str(), Some("f\u{fffd}o"));
    }
}
