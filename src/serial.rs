//! Serde integration support.
//!
//! Clients are sloppy about whether identifiers travel as JSON numbers or as
//! numeric strings, so every identifier decoder in this crate accepts both.

use std::fmt;

use serde::de::{Error, Unexpected, Visitor};
use serde::*;
use serde_json::Value;

fn i64_to_u64<'d, V: Visitor<'d>, E: Error>(v: V, n: i64) -> Result<V::Value, E> {
    if n >= 0 {
        v.visit_u64(n as u64)
    } else {
        Err(E::invalid_value(Unexpected::Signed(n), &v))
    }
}

/// Deserialize a maybe-string ID into a u64.
pub fn deserialize_id<'d, D: Deserializer<'d>>(d: D) -> Result<u64, D::Error> {
    struct IdVisitor;
    impl<'d> Visitor<'d> for IdVisitor {
        type Value = u64;

        fn expecting(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
            write!(fmt, "a u64 or parseable string")
        }

        fn visit_i64<E: Error>(self, v: i64) -> Result<u64, E> {
            i64_to_u64(self, v)
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<u64, E> {
            v.parse::<u64>()
                .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
        }
    }

    d.deserialize_any(IdVisitor)
}

/// Extract a maybe-string ID from an already-parsed JSON value.
///
/// Returns `None` for anything that is not a non-negative integer or a string
/// that parses as one.
pub fn id_from_value(value: &Value) -> Option<u64> {
    match *value {
        Value::Number(ref n) => n.as_u64(),
        Value::String(ref s) => s.parse::<u64>().ok(),
        _ => None,
    }
}

/// Render a JSON value the way it reads in an error message.
///
/// Strings are unquoted; everything else keeps its JSON form.
pub fn value_for_display(value: &Value) -> String {
    match *value {
        Value::String(ref s) => s.clone(),
        ref other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_accept_numbers_and_numeric_strings() {
        assert_eq!(id_from_value(&json!(42)), Some(42));
        assert_eq!(id_from_value(&json!("42")), Some(42));
        assert_eq!(id_from_value(&json!(0)), Some(0));
        assert_eq!(id_from_value(&json!("abc")), None);
        assert_eq!(id_from_value(&json!(-3)), None);
        assert_eq!(id_from_value(&json!(1.5)), None);
        assert_eq!(id_from_value(&json!(true)), None);
    }

    #[test]
    fn display_rendering_unquotes_strings() {
        assert_eq!(value_for_display(&json!("abc")), "abc");
        assert_eq!(value_for_display(&json!(7)), "7");
        assert_eq!(value_for_display(&json!(["x"])), "[\"x\"]");
    }
}
