use crate::error::TadoError;
use serde::Serialize;
use serde_json::Value;

/// Walk `path` through nested objects (and arrays, for numeric segments).
///
/// Errors with [`TadoError::MissingField`] naming the dotted path when any segment is
/// absent or the value at it is `null`.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Result<&'a Value, TadoError> {
    let mut current = value;
    for (depth, segment) in path.iter().enumerate() {
        let next = match current {
            Value::Object(map) => map.get(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = match next {
            Some(v) if !v.is_null() => v,
            _ => return Err(TadoError::MissingField(path[..=depth].join("."))),
        };
    }
    Ok(current)
}

/// Like [`lookup`], but the target must be a number.
pub fn lookup_f64(value: &Value, path: &[&str]) -> Result<f64, TadoError> {
    lookup(value, path)?
        .as_f64()
        .ok_or_else(|| TadoError::MissingField(format!("{} (not a number)", path.join("."))))
}

/// Serialize a serde-backed enum into its string name (e.g. SCREAMING_SNAKE_CASE).
pub fn serde_enum_name<T: Serialize>(val: &T) -> Option<String> {
    serde_json::to_value(val).ok()?.as_str().map(|s| s.to_string())
}
