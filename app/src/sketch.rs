// ==============================================================================
// sketch.rs - Sketch Payload Decoding
// ==============================================================================
// Description: Decodes base-16 encoded sketch fields back to integers
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Clients ship 64-bit sketch values as "0x..." strings so they survive a JSON
// transport without losing precision. Each array field is decided on its own:
// if its first element is a hex string the whole field is decoded, otherwise
// the field is left untouched.
// ==============================================================================

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::error::{ClusterError, Result};

fn hex_literal() -> &'static Regex {
    static HEX: OnceLock<Regex> = OnceLock::new();
    HEX.get_or_init(|| Regex::new(r"^0[xX][0-9a-fA-F]+$").expect("valid hex regex"))
}

/// True when a field's representative element marks it as hex-encoded
pub fn is_hex_encoded(field: &[Value]) -> bool {
    match field.first() {
        Some(Value::String(s)) => hex_literal().is_match(s),
        _ => false,
    }
}

/// Return a decoded copy of a sketch; the input is not modified
pub fn decode_sketch(hash: &str, sketch: &Value) -> Result<Value> {
    let fields = sketch.as_object().ok_or_else(|| ClusterError::InvalidSketch {
        hash: hash.to_string(),
        reason: "sketch is not a JSON object".to_string(),
    })?;

    let mut decoded = Map::with_capacity(fields.len());
    for (name, value) in fields {
        let value = match value {
            Value::Array(items) if is_hex_encoded(items) => {
                Value::Array(decode_field(hash, name, items)?)
            }
            other => other.clone(),
        };
        decoded.insert(name.clone(), value);
    }

    Ok(Value::Object(decoded))
}

fn decode_field(hash: &str, name: &str, items: &[Value]) -> Result<Vec<Value>> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let text = item.as_str().ok_or_else(|| ClusterError::InvalidSketch {
                hash: hash.to_string(),
                reason: format!("field {} element {} is not a hex string", name, idx),
            })?;
            let digits = text
                .strip_prefix("0x")
                .or_else(|| text.strip_prefix("0X"))
                .unwrap_or(text);
            u64::from_str_radix(digits, 16)
                .map(Value::from)
                .map_err(|e| ClusterError::InvalidSketch {
                    hash: hash.to_string(),
                    reason: format!("field {} element {} ({}): {}", name, idx, text, e),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_hex_fields() {
        let sketch = json!({
            "14": ["0x1f", "0xff", "0xFFFFFFFFFFFFFFFF"],
            "17": ["0x0"],
            "bases": [0.25, 0.25, 0.25, 0.25],
            "version": "1.0"
        });

        let decoded = decode_sketch("h1", &sketch).unwrap();

        assert_eq!(decoded["14"], json!([31, 255, u64::MAX]));
        assert_eq!(decoded["17"], json!([0]));
        assert_eq!(decoded["bases"], sketch["bases"]);
        assert_eq!(decoded["version"], "1.0");
    }

    #[test]
    fn test_numeric_fields_untouched() {
        let sketch = json!({"14": [31, 255], "17": ["0x10", "0x11"]});

        let decoded = decode_sketch("h1", &sketch).unwrap();

        assert_eq!(decoded["14"], json!([31, 255]));
        assert_eq!(decoded["17"], json!([16, 17]));
    }

    #[test]
    fn test_decision_uses_first_element_only() {
        // First element is not hex, so the field is passed through as-is
        let sketch = json!({"14": ["abc", "0x10"]});
        let decoded = decode_sketch("h1", &sketch).unwrap();
        assert_eq!(decoded["14"], json!(["abc", "0x10"]));

        // First element is hex, so every element must decode
        let mixed = json!({"14": ["0x10", "zz"]});
        assert!(matches!(
            decode_sketch("h1", &mixed).unwrap_err(),
            ClusterError::InvalidSketch { .. }
        ));
    }

    #[test]
    fn test_decoding_is_applied_once() {
        let sketch = json!({"14": ["0x10"]});

        let once = decode_sketch("h1", &sketch).unwrap();
        let twice = decode_sketch("h1", &once).unwrap();

        // The source value is left alone and the decoded value is stable
        assert_eq!(sketch["14"], json!(["0x10"]));
        assert_eq!(once, twice);
        assert!(!is_hex_encoded(once["14"].as_array().unwrap()));
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(decode_sketch("h1", &json!([1, 2])).is_err());
    }
}
