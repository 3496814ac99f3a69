//! JSON encoding helpers for persisted values.
//!
//! JSON numbers lose precision past 2^53, so persisted arbitrary-precision
//! integers are written as tagged strings: `"#bigint.<decimal>"`. The
//! [`bigint`] module is a serde `with` adapter for [`U256`] fields, and
//! [`deep_equal`] compares JSON documents with tagged integers and plain
//! numbers treated as the same numeric value.

use std::str::FromStr;

use alloy::primitives::U256;
use serde_json::Value;

/// Prefix marking a tagged arbitrary-precision integer.
pub const BIGINT_TAG: &str = "#bigint.";

/// Encode an integer as a tagged string.
#[must_use]
pub fn encode_bigint(value: &U256) -> String {
    format!("{BIGINT_TAG}{value}")
}

/// Decode a tagged string back into an integer.
///
/// Returns `None` if the tag is missing or the payload is not a decimal
/// integer.
#[must_use]
pub fn decode_bigint(value: &str) -> Option<U256> {
    value
        .strip_prefix(BIGINT_TAG)
        .and_then(|digits| U256::from_str_radix(digits, 10).ok())
}

/// Serde adapter for `U256` fields: `#[serde(with = "tsuna::storage::codec::bigint")]`.
///
/// Serializes as `"#bigint.<decimal>"`. Deserialization also accepts plain
/// decimal or `0x` hex strings and JSON integers.
pub mod bigint {
    use alloy::primitives::U256;
    use serde::de::{self, Deserializer, Visitor};
    use serde::ser::Serializer;

    use super::{decode_bigint, encode_bigint, parse_plain};

    /// Serialize as a tagged string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_bigint(value))
    }

    /// Deserialize from a tagged string, plain string or integer.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an integer representation.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        deserializer.deserialize_any(BigIntVisitor)
    }

    struct BigIntVisitor;

    impl Visitor<'_> for BigIntVisitor {
        type Value = U256;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a #bigint.-tagged string, a numeric string or an unsigned integer")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
            Ok(U256::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<U256, E> {
            u64::try_from(v)
                .map(U256::from)
                .map_err(|_| E::custom(format!("negative integer {v}")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<U256, E> {
            decode_bigint(v)
                .or_else(|| parse_plain(v))
                .ok_or_else(|| E::custom(format!("invalid integer string {v:?}")))
        }
    }
}

fn parse_plain(value: &str) -> Option<U256> {
    if value.starts_with("0x") || value.starts_with("0X") {
        U256::from_str(value).ok()
    } else {
        U256::from_str_radix(value, 10).ok()
    }
}

fn as_integer(value: &Value) -> Option<U256> {
    match value {
        Value::Number(n) => n.as_u64().map(U256::from),
        Value::String(s) => decode_bigint(s),
        _ => None,
    }
}

/// Structural equality over JSON values.
///
/// Objects compare key-wise regardless of key order, arrays element-wise.
/// Tagged integers and non-negative JSON integers compare by numeric value,
/// so `"#bigint.5"` equals `5`. Floats compare with `==`.
#[must_use]
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (as_integer(a), as_integer(b)) {
        return x == y;
    }
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| deep_equal(v, w)))
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(v, w)| deep_equal(v, w))
        }
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
