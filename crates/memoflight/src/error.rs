// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

use crate::ResultShape;

/// The failure observed by a caller of a wrapped function.
///
/// Failures of the wrapped operation itself are carried unchanged in [`Error::Invocation`], so
/// the original error value (and its `Display`/`source` chain) reaches every caller. The other
/// variants describe failures of the wrapping machinery for a single call; none of them affect
/// other keys or other windows.
///
/// The type is `Clone` because one outcome is replayed to every caller attached to the same
/// invocation.
///
/// # Thread safety
///
/// This type is thread-safe if `E` is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error<E> {
    /// The wrapped operation failed with this error.
    #[error(transparent)]
    Invocation(E),

    /// The result shape declared at wrap time does not match what the operation produced.
    #[error("declared a {declared} result but the operation produced a {actual} result")]
    ShapeMismatch {
        /// The shape the wrapper was configured with.
        declared: ResultShape,
        /// The shape of the producer the operation actually returned.
        actual: ResultShape,
    },

    /// The operation produced a stream that completed without a value, but a single value
    /// was requested.
    #[error("the operation completed without producing a value")]
    Empty,

    /// The operation panicked, either when called or while its result was being driven.
    #[error("the operation panicked: {0}")]
    Panicked(String),

    /// The call was made outside of a Tokio runtime, so nothing could drive the operation.
    #[error("no Tokio runtime is available to drive the operation")]
    NoRuntime,
}

impl<E> Error<E> {
    /// Returns the wrapped operation's error, if this is an invocation failure.
    #[must_use]
    pub fn invocation(&self) -> Option<&E> {
        match self {
            Self::Invocation(e) => Some(e),
            _ => None,
        }
    }

    /// Consumes the error and returns the wrapped operation's error, if this is an
    /// invocation failure.
    #[must_use]
    pub fn into_invocation(self) -> Option<E> {
        match self {
            Self::Invocation(e) => Some(e),
            _ => None,
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("backend unavailable")]
    struct BackendError;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(Error<BackendError>: Send, Sync, Clone);
    }

    #[test]
    fn invocation_is_transparent() {
        let e = Error::Invocation(BackendError);
        assert_eq!(e.to_string(), "backend unavailable");
        assert_eq!(e.invocation(), Some(&BackendError));
        assert_eq!(e.into_invocation(), Some(BackendError));
    }

    #[test]
    fn machinery_errors_carry_no_invocation() {
        let e: Error<BackendError> = Error::ShapeMismatch {
            declared: ResultShape::Future,
            actual: ResultShape::Stream,
        };
        assert_eq!(e.to_string(), "declared a future result but the operation produced a stream result");
        assert!(e.invocation().is_none());
        assert!(Error::<BackendError>::Empty.into_invocation().is_none());
    }

    #[test]
    fn panic_message_variants() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }
}
