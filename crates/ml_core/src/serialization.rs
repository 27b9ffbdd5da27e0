//! Canonical JSON serialization helpers.
//!
//! Model artifacts are written with recursively sorted object keys and a
//! fixed indent so the same model always produces the same bytes, and the
//! BLAKE3 digest of those bytes identifies the model across processes.

use serde::{ser::Error as SerdeSerError, Serialize};
use serde_json::{self, ser::PrettyFormatter, Serializer};
use std::io::Write;

/// Serialize a value into canonical JSON and write it to the provided writer.
pub fn write_canonical_json<T, W>(mut writer: W, value: &T) -> Result<(), serde_json::Error>
where
    T: Serialize,
    W: Write,
{
    // `serde_json::Map` is a BTreeMap unless `preserve_order` is enabled, so the
    // round trip through `Value` sorts object keys at every depth.
    let canonical_value = serde_json::to_value(value)?;
    let formatter = PrettyFormatter::with_indent(b"  ");
    let mut serializer = Serializer::with_formatter(&mut writer, formatter);
    canonical_value.serialize(&mut serializer)?;
    Ok(())
}

/// Serialize a value into canonical JSON and return it as a String.
pub fn canonical_json_string<T>(value: &T) -> Result<String, serde_json::Error>
where
    T: Serialize,
{
    let mut buffer = Vec::new();
    write_canonical_json(&mut buffer, value)?;
    String::from_utf8(buffer).map_err(|err| SerdeSerError::custom(err.to_string()))
}

/// BLAKE3 digest (hex) of arbitrary artifact bytes
pub fn hash_bytes_hex(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

/// BLAKE3 digest (hex) of a value's canonical JSON form
pub fn model_hash_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = canonical_json_string(value)?;
    Ok(hash_bytes_hex(json.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Unordered {
        zeta: u8,
        alpha: u8,
        nested: Nested,
    }

    #[derive(Serialize)]
    struct Nested {
        b: u8,
        a: u8,
    }

    fn value() -> Unordered {
        Unordered {
            zeta: 1,
            alpha: 2,
            nested: Nested { b: 3, a: 4 },
        }
    }

    #[test]
    fn test_keys_are_sorted_recursively() {
        let json = canonical_json_string(&value()).unwrap();
        let alpha = json.find("alpha").unwrap();
        let zeta = json.find("zeta").unwrap();
        assert!(alpha < zeta);
        let a = json.find("\"a\"").unwrap();
        let b = json.find("\"b\"").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_hash_is_stable() {
        let first = model_hash_hex(&value()).unwrap();
        let second = model_hash_hex(&value()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_eq!(
            first,
            hash_bytes_hex(canonical_json_string(&value()).unwrap().as_bytes())
        );
    }
}
