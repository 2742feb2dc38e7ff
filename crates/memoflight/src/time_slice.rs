// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Call-coalescing throttle.

use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{Level, event};

use crate::flight::{self, Flight};
use crate::{Error, Producer, ResultHandle, ResultShape, TimeSliceOptions};

type WrappedFn<A, T, E> = dyn Fn(A) -> Producer<T, E> + Send + Sync;

/// Wraps an async function so that bursts of calls trigger a single invocation.
///
/// The first call opens a window of the configured length. Calls made while the window is
/// open replace the pending arguments (last write wins). When the window closes the wrapped
/// function is invoked once, with the most recent arguments, and every caller of the window
/// observes that single outcome. The next call after a window closed opens a new one.
///
/// Earlier callers in a window do not get a result computed from their own arguments; they
/// get the result for the latest arguments, which suits "search as you type" style inputs
/// where only the newest request matters.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use memoflight::{Producer, TimeSlice, TimeSliceOptions};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let search = TimeSlice::new(
///     |query: String| Producer::future(async move { Ok::<_, String>(format!("results for {query}")) }),
///     TimeSliceOptions::new().window(Duration::from_millis(50)),
/// );
///
/// let first = search.call("ru".to_string());
/// let second = search.call("rust".to_string());
/// assert_eq!(first.await, Ok("results for rust".to_string()));
/// assert_eq!(second.await, Ok("results for rust".to_string()));
/// # }
/// ```
pub struct TimeSlice<A, T, E> {
    inner: Arc<Inner<A, T, E>>,
}

struct Inner<A, T, E> {
    name: Cow<'static, str>,
    window: Duration,
    shape: ResultShape,
    func: Box<WrappedFn<A, T, E>>,
    slot: Mutex<Slot<A, T, E>>,
}

enum Slot<A, T, E> {
    Idle,
    WindowOpen { pending: A, flight: Arc<Flight<T, E>> },
}

impl<A, T, E> TimeSlice<A, T, E>
where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wraps `func`.
    pub fn new<F>(func: F, options: TimeSliceOptions) -> Self
    where
        F: Fn(A) -> Producer<T, E> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                name: Cow::Owned(options.name_value().to_string()),
                window: options.window_value(),
                shape: options.shape_value(),
                func: Box::new(func),
                slot: Mutex::new(Slot::Idle),
            }),
        }
    }

    /// Schedules a call with `args`, merging it into the open window if there is one.
    ///
    /// Never blocks and never invokes the wrapped function on the caller's stack; the
    /// invocation happens when the window closes.
    pub fn call(&self, args: A) -> ResultHandle<T, E> {
        let inner = &self.inner;
        let Ok(runtime) = Handle::try_current() else {
            event!(Level::WARN, message = "called outside of a Tokio runtime", time_slice = %inner.name);
            return ResultHandle::failed(Error::NoRuntime);
        };

        let mut slot = inner.slot.lock();
        if let Slot::WindowOpen { pending, flight } = &mut *slot {
            *pending = args;
            event!(Level::TRACE, message = "joining open window", time_slice = %inner.name);
            return ResultHandle::new(Arc::clone(flight));
        }

        let flight = Arc::new(Flight::new());
        *slot = Slot::WindowOpen {
            pending: args,
            flight: Arc::clone(&flight),
        };
        drop(slot);

        event!(Level::DEBUG, message = "window opened", time_slice = %inner.name, window = ?inner.window);
        let inner = Arc::clone(inner);
        runtime.spawn(async move {
            tokio::time::sleep(inner.window).await;
            inner.close_window().await;
        });

        ResultHandle::new(flight)
    }

    /// Turns the wrapper into a plain function.
    pub fn into_fn(self) -> impl Fn(A) -> ResultHandle<T, E> + Clone + Send + Sync + 'static {
        move |args| self.call(args)
    }
}

impl<A, T, E> TimeSlice<A, T, E> {
    /// Returns `true` while a window is open and waiting to invoke the wrapped function.
    #[must_use]
    pub fn is_window_open(&self) -> bool {
        matches!(*self.inner.slot.lock(), Slot::WindowOpen { .. })
    }

    /// Returns the name of this instance.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.inner.window
    }
}

impl<A, T, E> Inner<A, T, E> {
    async fn close_window(&self) {
        let previous = std::mem::replace(&mut *self.slot.lock(), Slot::Idle);
        let Slot::WindowOpen { pending, flight } = previous else {
            return;
        };

        event!(Level::DEBUG, message = "window closed, invoking", time_slice = %self.name);
        let started = flight::start(|| (self.func)(pending));
        flight::drive(started, self.shape, &flight).await;
    }
}

impl<A, T, E> Clone for TimeSlice<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T, E> Debug for TimeSlice<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeSlice")
            .field("name", &self.inner.name)
            .field("window", &self.inner.window)
            .field("shape", &self.inner.shape)
            .field("window_open", &self.is_window_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::flight::EntryState;

    fn echo(query: String) -> Producer<String, String> {
        Producer::ready(Ok(query))
    }

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(TimeSlice<String, String, String>: Send, Sync, Clone);
    }

    #[test]
    fn call_without_runtime_fails_gracefully() {
        let slice = TimeSlice::new(echo, TimeSliceOptions::new());
        assert_eq!(slice.call("q".to_string()).state(), EntryState::Failed);
        assert!(!slice.is_window_open());
    }

    #[tokio::test(start_paused = true)]
    async fn window_opens_and_closes() {
        let slice = TimeSlice::new(echo, TimeSliceOptions::new().name("search").window(Duration::from_millis(30)));
        assert!(!slice.is_window_open());

        let handle = slice.call("q".to_string());
        assert!(slice.is_window_open());
        assert_eq!(handle.state(), EntryState::Pending);
        assert!(format!("{slice:?}").contains("window_open: true"));

        assert_eq!(handle.await, Ok("q".to_string()));
        assert!(!slice.is_window_open());
        assert_eq!(slice.name(), "search");
        assert_eq!(slice.window(), Duration::from_millis(30));
    }
}
