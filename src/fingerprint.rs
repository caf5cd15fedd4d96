//! Canonical serialization and content hash of the desired configuration.
//!
//! The same canonical bytes are used for the hash and for the tfvars file
//! mounted on the stack, so the persisted hash always describes exactly what
//! was pushed.

use std::collections::BTreeMap;
use std::fmt;

use aws_lc_rs::digest::{digest, SHA256};
use serde_json::Value;

use crate::block::DesiredConfig;
use crate::Result;

/// Hex-encoded SHA-256 of a canonical configuration document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed hex digest (e.g. one read back from the store)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render the configuration as the canonical tfvars JSON document.
///
/// Keys are emitted in sorted order with two-space indentation. Integral
/// floats are written as integers, so `8.0` and `8` produce the same document.
pub fn canonical_json(config: &DesiredConfig) -> Result<String> {
    let values: BTreeMap<&String, Value> = config
        .values()
        .iter()
        .map(|(key, value)| (key, normalize_number(value)))
        .collect();
    Ok(serde_json::to_string_pretty(&values)?)
}

fn normalize_number(value: &Value) -> Value {
    if let Value::Number(n) = value {
        if let Some(f) = n.as_f64().filter(|_| n.is_f64()) {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                return Value::from(f as i64);
            }
        }
    }
    value.clone()
}

/// Hash a canonical document.
pub fn fingerprint_document(document: &str) -> Fingerprint {
    Fingerprint(sha256_hex(document))
}

/// Hex-encoded SHA-256 of arbitrary text.
pub fn sha256_hex(input: &str) -> String {
    let hash = digest(&SHA256, input.as_bytes());
    hash.as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Fingerprint the desired configuration.
pub fn fingerprint(config: &DesiredConfig) -> Result<Fingerprint> {
    Ok(fingerprint_document(&canonical_json(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(pairs: &[(&str, serde_json::Value)]) -> DesiredConfig {
        DesiredConfig::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())))
            .expect("scalar values")
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let a = config(&[("prefix", json!("demo")), ("random_length", json!(8))]);
        let b = config(&[("random_length", json!(8)), ("prefix", json!("demo"))]);
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_any_changed_value_changes_fingerprint() {
        let base = config(&[("prefix", json!("demo")), ("include_special_chars", json!(true))]);
        let changed_string = config(&[
            ("prefix", json!("demo2")),
            ("include_special_chars", json!(true)),
        ]);
        let changed_bool = config(&[
            ("prefix", json!("demo")),
            ("include_special_chars", json!(false)),
        ]);
        let extra_key = config(&[
            ("prefix", json!("demo")),
            ("include_special_chars", json!(true)),
            ("password_length", json!(16)),
        ]);

        let fp = fingerprint(&base).unwrap();
        assert_ne!(fp, fingerprint(&changed_string).unwrap());
        assert_ne!(fp, fingerprint(&changed_bool).unwrap());
        assert_ne!(fp, fingerprint(&extra_key).unwrap());
    }

    #[test]
    fn test_type_is_part_of_the_fingerprint() {
        let number = config(&[("random_length", json!(8))]);
        let string = config(&[("random_length", json!("8"))]);
        assert_ne!(fingerprint(&number).unwrap(), fingerprint(&string).unwrap());
    }

    #[test]
    fn test_integral_floats_match_integers() {
        let int = config(&[("random_length", json!(8))]);
        let float = config(&[("random_length", json!(8.0))]);
        assert_eq!(fingerprint(&int).unwrap(), fingerprint(&float).unwrap());
        assert_eq!(canonical_json(&float).unwrap(), "{\n  \"random_length\": 8\n}");
    }

    #[test]
    fn test_fractional_floats_are_kept() {
        let doc = canonical_json(&config(&[("ratio", json!(0.5)), ("n", json!(-3.0))])).unwrap();
        assert_eq!(doc, "{\n  \"n\": -3,\n  \"ratio\": 0.5\n}");
        assert_ne!(
            fingerprint(&config(&[("n", json!(8.5))])).unwrap(),
            fingerprint(&config(&[("n", json!(8))])).unwrap()
        );
    }

    #[test]
    fn test_fingerprint_is_fixed_length_hex() {
        let fp = fingerprint(&config(&[("prefix", json!("demo"))])).unwrap();
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(Fingerprint::from_hex(fp.as_str()), fp);
    }

    #[test]
    fn test_canonical_json_is_sorted_and_indented() {
        let doc = canonical_json(&config(&[("b", json!(1)), ("a", json!("x"))])).unwrap();
        assert_eq!(doc, "{\n  \"a\": \"x\",\n  \"b\": 1\n}");
    }

    #[test]
    fn test_known_digest_of_empty_document() {
        // SHA-256("")
        assert_eq!(
            fingerprint_document("").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
