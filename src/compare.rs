use fxhash::FxHasher;
use serde_json::Value;
use std::hash::{Hash, Hasher};

/// json_eq is structural equality of JSON values: equal kinds and
/// recursively equal contents. Object property order is irrelevant, and
/// numbers compare numerically across their u64 / i64 / f64
/// representations, so `1`, `1.0`, and `1e0` are all equal.
pub fn json_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(lhs), Value::Bool(rhs)) => lhs == rhs,
        (Value::Number(lhs), Value::Number(rhs)) => number_eq(lhs, rhs),
        (Value::String(lhs), Value::String(rhs)) => lhs == rhs,
        (Value::Array(lhs), Value::Array(rhs)) => {
            lhs.len() == rhs.len() && lhs.iter().zip(rhs).all(|(lhs, rhs)| json_eq(lhs, rhs))
        }
        (Value::Object(lhs), Value::Object(rhs)) => {
            // Maps iterate in sorted property order, so a pairwise walk
            // compares keyed entries regardless of document order.
            lhs.len() == rhs.len()
                && lhs
                    .iter()
                    .zip(rhs)
                    .all(|((lhs_p, lhs_v), (rhs_p, rhs_v))| lhs_p == rhs_p && json_eq(lhs_v, rhs_v))
        }
        _ => false,
    }
}

fn number_eq(lhs: &serde_json::Number, rhs: &serde_json::Number) -> bool {
    match (lhs.as_u64(), rhs.as_u64(), lhs.as_i64(), rhs.as_i64()) {
        (Some(lhs), Some(rhs), _, _) => lhs == rhs,
        (None, None, Some(lhs), Some(rhs)) => lhs == rhs,
        _ => lhs.as_f64().unwrap_or_default() == rhs.as_f64().unwrap_or_default(),
    }
}

/// json_hash folds a structural hash of |v|: values which are json_eq hash
/// identically, including numbers of differing representation (`1` vs `1.0`)
/// and objects of differing property order. The converse does not hold, so a
/// hash match must be confirmed with json_eq.
pub fn json_hash(v: &Value) -> u64 {
    let mut state = FxHasher::default();
    fold_hash(v, &mut state);
    state.finish()
}

fn fold_hash<H: Hasher>(v: &Value, state: &mut H) {
    match v {
        Value::Null => state.write_u8(0),
        Value::Bool(b) => {
            state.write_u8(1);
            b.hash(state);
        }
        Value::Number(n) => {
            state.write_u8(2);
            // Canonicalize representation: integral values hash as integers
            // regardless of whether they parsed as u64, i64, or f64.
            if let Some(u) = n.as_u64() {
                state.write_u64(u);
            } else if let Some(i) = n.as_i64() {
                state.write_i64(i);
            } else {
                let f = n.as_f64().unwrap_or_default();
                if f.fract() == 0.0 && f >= 0.0 && f <= u64::MAX as f64 {
                    state.write_u64(f as u64);
                } else if f.fract() == 0.0 && f < 0.0 && f >= i64::MIN as f64 {
                    state.write_i64(f as i64);
                } else {
                    state.write_u64(f.to_bits());
                }
            }
        }
        Value::String(s) => {
            state.write_u8(3);
            s.hash(state);
        }
        Value::Array(arr) => {
            state.write_u8(4);
            state.write_usize(arr.len());
            for item in arr {
                fold_hash(item, state);
            }
        }
        Value::Object(map) => {
            state.write_u8(5);
            state.write_usize(map.len());
            // Map iteration is in sorted property order, making the fold
            // deterministic and order-insensitive.
            for (prop, value) in map {
                prop.hash(state);
                fold_hash(value, state);
            }
        }
    }
}
