//! JSON convenience helpers.
//!
//! Thin wrappers around `serde_json` with a null-field-omission option,
//! UTF-8 byte-stream variants, and a fixed `%Y-%m-%d %H:%M:%S` date format
//! for serde `with` attributes. Errors are `serde_json::Error`, propagated
//! unchanged.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Serialize a value to a JSON string.
pub fn to_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string(value)
}

/// Serialize a value to a JSON string, optionally omitting null-valued
/// fields (recursively) from the output.
pub fn to_json_opt<T: Serialize>(value: &T, ignore_null: bool) -> serde_json::Result<String> {
    if !ignore_null {
        return serde_json::to_string(value);
    }
    let mut tree = serde_json::to_value(value)?;
    strip_nulls(&mut tree);
    serde_json::to_string(&tree)
}

/// Deserialize a value from a JSON string.
pub fn from_json<T: DeserializeOwned>(json: &str) -> serde_json::Result<T> {
    serde_json::from_str(json)
}

/// Serialize a value to JSON as UTF-8 bytes.
pub fn to_utf8_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(value)
}

/// Deserialize a value from JSON UTF-8 bytes.
pub fn from_utf8_json<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<T> {
    serde_json::from_slice(bytes)
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            for v in map.values_mut() {
                strip_nulls(v);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                strip_nulls(v);
            }
        }
        _ => {}
    }
}

/// Serde `with` module fixing `NaiveDateTime` to `%Y-%m-%d %H:%M:%S`.
///
/// ```
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct Event {
///     #[serde(with = "corekit::json::datetime_format")]
///     at: chrono::NaiveDateTime,
/// }
/// ```
pub mod datetime_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Like [`datetime_format`], for optional fields.
pub mod option_datetime_format {
    use super::datetime_format::FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom))
            .transpose()
    }
}
