// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Result shapes of wrapped operations.

use std::fmt::{self, Debug, Display};

use futures_util::{FutureExt, Stream, StreamExt, future::BoxFuture, stream::BoxStream};
use serde::{Deserialize, Serialize};

/// The shape of the result produced by a wrapped operation.
///
/// Wrappers are configured with a declared shape. [`ResultShape::Infer`] accepts whatever the
/// operation produces at runtime; a concrete declaration turns a disagreeing producer into an
/// [`Error::ShapeMismatch`](crate::Error::ShapeMismatch) for that call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    /// The operation resolves exactly once with a value or an error.
    Future,
    /// The operation emits zero or more values, then completes or fails.
    Stream,
    /// Accept either shape and adapt to whatever the operation returns.
    #[default]
    Infer,
}

impl ResultShape {
    pub(crate) fn accepts(self, actual: Self) -> bool {
        self == Self::Infer || self == actual
    }
}

impl Display for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Future => "future",
            Self::Stream => "stream",
            Self::Infer => "inferred",
        })
    }
}

/// The raw result of one invocation of a wrapped operation.
///
/// # Examples
///
/// ```
/// use memoflight::Producer;
///
/// let single: Producer<u32, String> = Producer::future(async { Ok(42) });
/// let many: Producer<u32, String> = Producer::stream(futures_util::stream::iter([Ok(1), Ok(2)]));
/// let failed: Producer<u32, String> = Producer::ready(Err("nope".to_string()));
/// # let _ = (single, many, failed);
/// ```
pub enum Producer<T, E> {
    /// A single eventual value.
    Future(BoxFuture<'static, Result<T, E>>),
    /// An ordered sequence of values. The first `Err` item terminates the sequence.
    Stream(BoxStream<'static, Result<T, E>>),
}

impl<T, E> Producer<T, E> {
    /// Creates a producer from a future.
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::Future(future.boxed())
    }

    /// Creates a producer from a stream.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
    {
        Self::Stream(stream.boxed())
    }

    /// Creates a producer that is already settled.
    ///
    /// Use this to report a failure detected synchronously by the wrapped function.
    pub fn ready(result: Result<T, E>) -> Self
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        Self::future(std::future::ready(result))
    }

    /// Returns the runtime shape of this producer, never [`ResultShape::Infer`].
    #[must_use]
    pub fn shape(&self) -> ResultShape {
        match self {
            Self::Future(_) => ResultShape::Future,
            Self::Stream(_) => ResultShape::Stream,
        }
    }
}

impl<T, E> Debug for Producer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Producer").field(&self.shape()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_accepts_everything() {
        assert!(ResultShape::Infer.accepts(ResultShape::Future));
        assert!(ResultShape::Infer.accepts(ResultShape::Stream));
        assert!(ResultShape::Future.accepts(ResultShape::Future));
        assert!(!ResultShape::Future.accepts(ResultShape::Stream));
        assert!(!ResultShape::Stream.accepts(ResultShape::Future));
    }

    #[test]
    fn producer_reports_runtime_shape() {
        let p: Producer<u8, ()> = Producer::ready(Ok(1));
        assert_eq!(p.shape(), ResultShape::Future);
        assert_eq!(format!("{p:?}"), "Producer(Future)");

        let p: Producer<u8, ()> = Producer::stream(futures_util::stream::empty());
        assert_eq!(p.shape(), ResultShape::Stream);
    }

    #[test]
    fn shape_serde_names() {
        assert_eq!(serde_json::to_string(&ResultShape::Stream).ok().as_deref(), Some("\"stream\""));
        let parsed: ResultShape = serde_json::from_str("\"future\"").unwrap_or_default();
        assert_eq!(parsed, ResultShape::Future);
        assert_eq!(ResultShape::default(), ResultShape::Infer);
    }
}
