//! Final numeric clean-up applied to every response before it leaves the
//! service.

use serde::Serialize;
use serde_json::{Number, Value};

use crate::error::Result;

/// Largest integer a JSON consumer using doubles can represent exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Serialize `view` and run [`normalize_value`] over the result.
pub fn to_wire<T: Serialize>(view: &T) -> Result<Value> {
    let mut value = serde_json::to_value(view)?;
    normalize_value(&mut value);
    Ok(value)
}

/// Walk `value` recursively: integral floats within the safe range become
/// integers, non-finite numbers become `null`.
pub fn normalize_value(value: &mut Value) {
    match value {
        Value::Array(items) => items.iter_mut().for_each(normalize_value),
        Value::Object(map) => map.values_mut().for_each(normalize_value),
        Value::Number(n) => {
            if n.is_f64() {
                if let Some(replacement) = n.as_f64().map(normalize_float) {
                    *value = replacement;
                }
            }
        }
        _ => {}
    }
}

fn normalize_float(f: f64) -> Value {
    if !f.is_finite() {
        Value::Null
    } else if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
        Value::Number(Number::from(f as i64))
    } else {
        Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}
