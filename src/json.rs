//! Small helpers for assembling nested JSON objects.
//!
//! `serde_json` is built with `preserve_order`,
//! so keys are rendered in the order they are inserted here.

use serde_json::{Map, Value};

/// Creates an object holding a single key
pub fn object(key: impl Into<String>, value: impl Into<Value>) -> Value {
    let mut map = Map::new();
    map.insert(key.into(), value.into());
    Value::Object(map)
}

/// Creates an object from an ordered list of entries
pub fn object_of<K, I>(entries: I) -> Value
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    Value::Object(
        entries
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect::<Map<_, _>>(),
    )
}

/// Creates an empty object (`{}`)
pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Creates an array of JSON strings
pub fn string_array<S: AsRef<str>>(values: &[S]) -> Value {
    Value::Array(
        values
            .iter()
            .map(|s| Value::String(String::from(s.as_ref())))
            .collect(),
    )
}
