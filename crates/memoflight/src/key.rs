// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Argument fingerprints.
//!
//! A [`KeyCodec`] turns the arguments of one call into a string key. Two calls with
//! structurally equal arguments must produce the same key; calls with different arguments
//! should, with overwhelming probability, produce different keys.

use std::fmt::{self, Debug};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_128;

/// Derives a stable key from the arguments of a call.
///
/// Implementations must not depend on object identity: two distinct but structurally equal
/// argument values must map to the same key.
pub trait KeyCodec<A: ?Sized>: Send + Sync {
    /// Returns the key for `args`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the arguments cannot be fingerprinted. Wrappers treat this as
    /// "do not coalesce this call" rather than as a failure of the call.
    fn key(&self, args: &A) -> Result<String, KeyError>;
}

/// The arguments of a call could not be turned into a key.
#[derive(Debug, Error)]
#[error("failed to fingerprint call arguments")]
pub struct KeyError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl KeyError {
    /// Creates a key error from an underlying cause.
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self { source: source.into() }
    }
}

/// The default codec: canonical JSON of the arguments.
///
/// Arguments are serialized with `serde_json`; object members are emitted in sorted key order
/// so maps with the same contents produce the same key regardless of iteration order. The
/// [`hashed`](Self::hashed) variant reduces the canonical text to a fixed-length XXH3-128
/// digest, which keeps keys small for large arguments.
///
/// # Examples
///
/// ```
/// use memoflight::{JsonKeyCodec, KeyCodec};
///
/// let codec = JsonKeyCodec::new();
/// assert_eq!(codec.key(&(1, "a")).ok().as_deref(), Some(r#"[1,"a"]"#));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonKeyCodec {
    hashed: bool,
}

impl JsonKeyCodec {
    /// Creates a codec that uses the canonical JSON text as the key.
    #[must_use]
    pub const fn new() -> Self {
        Self { hashed: false }
    }

    /// Creates a codec that uses a 32 character hex digest of the canonical JSON as the key.
    #[must_use]
    pub const fn hashed() -> Self {
        Self { hashed: true }
    }
}

impl<A: Serialize + ?Sized> KeyCodec<A> for JsonKeyCodec {
    fn key(&self, args: &A) -> Result<String, KeyError> {
        let value = serde_json::to_value(args).map_err(KeyError::new)?;
        let mut canonical = String::new();
        write_canonical(&value, &mut canonical);

        if self.hashed {
            Ok(format!("{:032x}", xxh3_128(canonical.as_bytes())))
        } else {
            Ok(canonical)
        }
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut members: Vec<_> = map.iter().collect();
            members.sort_unstable_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (name, member)) in members.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(member, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Adapts a closure into a [`KeyCodec`].
///
/// # Examples
///
/// ```
/// use memoflight::{KeyCodec, KeyError, KeyFn};
///
/// // Only the user id matters, the request id is ignored.
/// let codec = KeyFn(|args: &(u64, u64)| Ok::<_, KeyError>(args.0.to_string()));
/// assert_eq!(codec.key(&(7, 1)).ok(), codec.key(&(7, 2)).ok());
/// ```
#[derive(Clone, Copy)]
pub struct KeyFn<F>(pub F);

impl<A, F> KeyCodec<A> for KeyFn<F>
where
    A: ?Sized,
    F: Fn(&A) -> Result<String, KeyError> + Send + Sync,
{
    fn key(&self, args: &A) -> Result<String, KeyError> {
        (self.0)(args)
    }
}

impl<F> Debug for KeyFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFn").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use serde_json::json;

    use super::*;

    #[derive(Serialize)]
    struct Point {
        x: i32,
    }

    fn key<A: Serialize + ?Sized>(args: &A) -> String {
        JsonKeyCodec::new().key(args).unwrap_or_default()
    }

    #[test]
    fn structurally_equal_arguments_share_a_key() {
        let first = key(&(1, "a", json!({ "x": 2 })));
        let second = key(&(1, "a", json!({ "x": 2 })));
        assert_eq!(first, second);
        assert_eq!(first, r#"[1,"a",{"x":2}]"#);

        assert_ne!(first, key(&(1, "a", json!({ "x": 3 }))));
    }

    #[test]
    fn typed_arguments_match_their_json_shape() {
        assert_eq!(key(&(1, "a", Point { x: 2 })), key(&(1, "a", json!({ "x": 2 }))));
    }

    #[test]
    fn map_order_does_not_matter() {
        let mut forward = HashMap::new();
        let mut backward = HashMap::new();
        for i in 0..32 {
            forward.insert(format!("k{i}"), i);
        }
        for i in (0..32).rev() {
            backward.insert(format!("k{i}"), i);
        }
        let sorted: BTreeMap<_, _> = forward.clone().into_iter().collect();

        assert_eq!(key(&forward), key(&backward));
        assert_eq!(key(&forward), key(&sorted));
    }

    #[test]
    fn keys_with_special_characters_are_escaped() {
        assert_eq!(key(&json!({ "a\"b": [true, null] })), r#"{"a\"b":[true,null]}"#);
    }

    #[test]
    fn hashed_keys_have_fixed_length() {
        let codec = JsonKeyCodec::hashed();
        let short = codec.key(&1).unwrap_or_default();
        let long = codec.key(&vec!["long argument"; 100]).unwrap_or_default();

        assert_eq!(short.len(), 32);
        assert_eq!(long.len(), 32);
        assert_ne!(short, long);
        assert_eq!(codec.key(&1).unwrap_or_default(), short);
    }

    #[test]
    fn unserializable_arguments_fail() {
        let mut args = HashMap::new();
        args.insert((1, 2), "tuple keys are not valid JSON object keys");

        let err = JsonKeyCodec::new().key(&args).err();
        assert!(err.is_some_and(|e| std::error::Error::source(&e).is_some()));
    }

    #[test]
    fn closures_are_codecs() {
        let codec = KeyFn(|args: &str| {
            if args.is_empty() {
                Err(KeyError::new("empty"))
            } else {
                Ok(args.to_uppercase())
            }
        });

        assert_eq!(codec.key("abc").ok().as_deref(), Some("ABC"));
        assert!(codec.key("").is_err());
        assert_eq!(format!("{codec:?}"), "KeyFn { .. }");
    }
}
