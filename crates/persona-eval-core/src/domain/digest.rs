//! Canonical JSON digests.
//!
//! Object keys are emitted in sorted order and integer-valued floats are
//! normalised, so two semantically equal rule sets hash identically no
//! matter how their YAML was laid out.

use sha2::{Digest, Sha256};

use crate::domain::error::{EvalError, Result};

/// Normalise numbers: integer-valued floats become integers; reject NaN/Infinity.
fn normalize_value(value: &serde_json::Value) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => {
            let mut normalized = serde_json::Map::new();
            for (k, v) in map.iter() {
                normalized.insert(k.clone(), normalize_value(v)?);
            }
            Ok(serde_json::Value::Object(normalized))
        }
        serde_json::Value::Array(arr) => {
            let normalized = arr
                .iter()
                .map(normalize_value)
                .collect::<Result<Vec<_>>>()?;
            Ok(serde_json::Value::Array(normalized))
        }
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Err(EvalError::InvalidConfig(
                "NaN/Infinity not permitted in canonical JSON".to_string(),
            )),
            Some(f) if !(n.is_i64() || n.is_u64()) && f.fract() == 0.0 && f.abs() < 1e15 => {
                Ok(serde_json::Value::Number(serde_json::Number::from(f as i64)))
            }
            _ => Ok(serde_json::Value::Number(n.clone())),
        },
        other => Ok(other.clone()),
    }
}

/// Canonical compact JSON with sorted keys.
pub fn canonical_json(value: &serde_json::Value) -> Result<String> {
    let normalized = normalize_value(value)?;
    // serde_json::Map is a BTreeMap, so keys serialise in sorted order.
    Ok(serde_json::to_string(&normalized)?)
}

/// SHA-256 hex digest of the canonical JSON form of `value`.
pub fn compute_digest(value: &serde_json::Value) -> Result<String> {
    let canonical = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_json_integer_float() {
        let input = serde_json::json!({ "weight": 1.0 });
        assert_eq!(canonical_json(&input).unwrap(), r#"{"weight":1}"#);
    }

    #[test]
    fn test_field_order_invariant() {
        let a = serde_json::json!({ "claim": "x", "id": "p1", "weight": 0.5 });
        let b = serde_json::json!({ "weight": 0.5, "id": "p1", "claim": "x" });
        assert_eq!(compute_digest(&a).unwrap(), compute_digest(&b).unwrap());
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        let d = compute_digest(&serde_json::json!({ "a": [1, 2, 3] })).unwrap();
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
