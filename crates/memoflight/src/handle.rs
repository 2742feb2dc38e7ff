// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Caller-facing result handles.

use std::fmt::{self, Debug};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{FutureExt, Stream, StreamExt};

use crate::flight::{EntryState, Flight};
use crate::Error;

/// The result of calling a wrapped function.
///
/// A handle is returned immediately by `call`; it is attached to the invocation that serves
/// the call, which may be shared with other callers. Consume it in the shape you need:
///
/// - `.await` (or [`settled`](Self::settled)) for a single value. A stream-shaped invocation
///   resolves with the last value it emitted before completing.
/// - [`into_stream`](Self::into_stream) for every value. A future-shaped invocation yields its
///   one value and then ends.
///
/// Dropping a handle only detaches this caller; the invocation keeps running for everyone
/// else.
pub struct ResultHandle<T, E> {
    flight: Arc<Flight<T, E>>,
}

impl<T, E> ResultHandle<T, E> {
    pub(crate) fn new(flight: Arc<Flight<T, E>>) -> Self {
        Self { flight }
    }

    pub(crate) fn failed(error: Error<E>) -> Self {
        Self::new(Arc::new(Flight::failed(error)))
    }

    /// Returns the current state of the invocation this handle is attached to.
    #[must_use]
    pub fn state(&self) -> EntryState {
        self.flight.state()
    }
}

impl<T, E> ResultHandle<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Waits for the invocation to settle and returns its value.
    ///
    /// # Errors
    ///
    /// Returns the failure of the invocation, replayed identically to every attached caller.
    pub async fn settled(self) -> Result<T, Error<E>> {
        self.flight.terminal().await
    }

    /// Converts the handle into a stream of every value the invocation produces.
    ///
    /// Values produced before the call are replayed first. A failure is yielded as the last
    /// item.
    #[must_use]
    pub fn into_stream(self) -> Subscription<T, E> {
        let items = stream::unfold((self.flight, 0_usize, false), |(flight, index, done)| async move {
            if done {
                return None;
            }
            match flight.item(index).await? {
                Ok(value) => Some((Ok(value), (flight, index + 1, false))),
                Err(error) => Some((Err(error), (flight, index, true))),
            }
        });

        Subscription { items: items.boxed() }
    }
}

impl<T, E> IntoFuture for ResultHandle<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = Result<T, Error<E>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.settled().boxed()
    }
}

impl<T, E> Debug for ResultHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle").field("state", &self.state()).finish()
    }
}

/// Stream-style view of a [`ResultHandle`].
pub struct Subscription<T, E> {
    items: BoxStream<'static, Result<T, Error<E>>>,
}

impl<T, E> Stream for Subscription<T, E> {
    type Item = Result<T, Error<E>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.items.poll_next_unpin(cx)
    }
}

impl<T, E> Debug for Subscription<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream as test_stream;
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::flight::drive;
    use crate::{Producer, ResultShape};

    async fn settled_flight(producer: Producer<u32, String>) -> Arc<Flight<u32, String>> {
        let flight = Arc::new(Flight::new());
        drive(Ok(producer), ResultShape::Infer, &flight).await;
        flight
    }

    #[test]
    fn handles_are_send() {
        assert_impl_all!(ResultHandle<u32, String>: Send, Sync);
        assert_impl_all!(Subscription<u32, String>: Send);
    }

    #[tokio::test]
    async fn future_as_stream_yields_one_value() {
        let flight = settled_flight(Producer::ready(Ok(5))).await;
        let values: Vec<_> = ResultHandle::new(flight).into_stream().collect().await;
        assert_eq!(values, vec![Ok(5)]);
    }

    #[tokio::test]
    async fn stream_as_future_yields_terminal_value() {
        let flight = settled_flight(Producer::stream(test_stream::iter([Ok(1), Ok(2), Ok(3)]))).await;
        assert_eq!(ResultHandle::new(Arc::clone(&flight)).await, Ok(3));

        let values: Vec<_> = ResultHandle::new(flight).into_stream().collect().await;
        assert_eq!(values, vec![Ok(1), Ok(2), Ok(3)]);
    }

    #[tokio::test]
    async fn stream_ends_after_failure() {
        let flight = settled_flight(Producer::stream(test_stream::iter([Ok(1), Err("late".to_string())]))).await;
        let values: Vec<_> = ResultHandle::new(flight).into_stream().collect().await;
        assert_eq!(values, vec![Ok(1), Err(Error::Invocation("late".to_string()))]);
    }

    #[tokio::test]
    async fn prefailed_handle() {
        let handle = ResultHandle::<u32, String>::failed(Error::NoRuntime);
        assert_eq!(handle.state(), EntryState::Failed);
        assert!(format!("{handle:?}").contains("Failed"));
        assert_eq!(handle.await, Err(Error::NoRuntime));
    }
}
