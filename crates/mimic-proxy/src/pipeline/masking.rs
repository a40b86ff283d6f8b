//! Secret masking for recorded requests.
//!
//! Any configured value found verbatim in a request header or body is
//! replaced by its key name before the exchange is stored.

use serde_json::Value;
use std::collections::BTreeMap;

/// Key/value pairs to mask, longest values first so a value containing
/// another is replaced whole. Empty values are ignored.
pub struct Masker {
    secrets: Vec<(String, String)>,
}

impl Masker {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        let mut secrets: Vec<(String, String)> =
            values.into_iter().filter(|(_, v)| !v.is_empty()).collect();
        secrets.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        Self { secrets }
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn mask_str(&self, text: &str) -> String {
        let mut masked = text.to_string();
        for (key, value) in &self.secrets {
            if masked.contains(value.as_str()) {
                masked = masked.replace(value.as_str(), key);
            }
        }
        masked
    }

    pub fn mask_headers(&self, headers: &mut BTreeMap<String, Vec<String>>) {
        if self.is_empty() {
            return;
        }
        for values in headers.values_mut() {
            for value in values.iter_mut() {
                *value = self.mask_str(value);
            }
        }
    }

    /// Strings are masked in place. Structured bodies are serialized, masked
    /// and parsed again; if the masked text no longer parses it is kept as a
    /// string.
    pub fn mask_body(&self, body: Option<Value>) -> Option<Value> {
        if self.is_empty() {
            return body;
        }
        match body? {
            Value::String(s) => Some(Value::String(self.mask_str(&s))),
            other => {
                let serialized = other.to_string();
                let masked = self.mask_str(&serialized);
                if masked == serialized {
                    return Some(other);
                }
                Some(serde_json::from_str(&masked).unwrap_or(Value::String(masked)))
            }
        }
    }
}
