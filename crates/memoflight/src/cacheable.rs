// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Coalescing cache with time-based expiry.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{Level, event};

use crate::flight::{self, EntryState, Flight};
use crate::{CacheOptions, Error, JsonKeyCodec, KeyCodec, Producer, ResultHandle, ResultShape};

type WrappedFn<A, T, E> = dyn Fn(A) -> Producer<T, E> + Send + Sync;

/// Wraps an async function so that calls with equal arguments share one invocation.
///
/// Each call derives a key from its arguments with a [`KeyCodec`]. The first call for a key
/// invokes the wrapped function; every call for the same key made while that invocation is in
/// flight, or within the TTL after it settled, is attached to the same outcome instead of
/// invoking the function again. Failures are cached and replayed the same way as successes,
/// and a call made after the entry expired invokes the function afresh.
///
/// The wrapper is cheap to clone; clones share the same entries. Work is driven on the ambient
/// Tokio runtime, so `call` must be made from within one; otherwise the returned handle fails
/// with [`Error::NoRuntime`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use memoflight::{CacheOptions, Cacheable, Producer};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let lookup = Cacheable::new(
///     |id: u64| Producer::future(async move { Ok::<_, String>(format!("user-{id}")) }),
///     CacheOptions::new().ttl(Duration::from_secs(60)),
/// );
///
/// let (a, b) = tokio::join!(lookup.call(7), lookup.call(7));
/// assert_eq!(a, Ok("user-7".to_string()));
/// assert_eq!(b, Ok("user-7".to_string()));
/// # }
/// ```
pub struct Cacheable<A, T, E> {
    inner: Arc<Inner<A, T, E>>,
}

struct Inner<A, T, E> {
    name: Cow<'static, str>,
    ttl: Duration,
    shape: ResultShape,
    func: Box<WrappedFn<A, T, E>>,
    codec: Box<dyn KeyCodec<A>>,
    entries: Mutex<Entries<T, E>>,
}

struct Entries<T, E> {
    map: HashMap<String, Entry<T, E>>,
    next_id: u64,
}

struct Entry<T, E> {
    // Distinguishes an entry from one re-created under the same key after invalidation, so a
    // stale expiry timer never removes the newer entry.
    id: u64,
    flight: Arc<Flight<T, E>>,
    expiry: Option<AbortHandle>,
}

impl<A, T, E> Cacheable<A, T, E>
where
    A: Serialize + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wraps `func`, fingerprinting arguments with [`JsonKeyCodec`].
    pub fn new<F>(func: F, options: CacheOptions) -> Self
    where
        F: Fn(A) -> Producer<T, E> + Send + Sync + 'static,
    {
        Self::with_codec(func, options, JsonKeyCodec::new())
    }
}

impl<A, T, E> Cacheable<A, T, E>
where
    A: 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wraps `func`, fingerprinting arguments with `codec`.
    pub fn with_codec<F, C>(func: F, options: CacheOptions, codec: C) -> Self
    where
        F: Fn(A) -> Producer<T, E> + Send + Sync + 'static,
        C: KeyCodec<A> + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                name: Cow::Owned(options.name_value().to_string()),
                ttl: options.ttl_value(),
                shape: options.shape_value(),
                func: Box::new(func),
                codec: Box::new(codec),
                entries: Mutex::new(Entries {
                    map: HashMap::new(),
                    next_id: 0,
                }),
            }),
        }
    }

    /// Calls the wrapped function, or attaches to the cached or in-flight invocation for
    /// equal arguments.
    ///
    /// Never blocks: the returned handle resolves once the serving invocation settles. If the
    /// arguments cannot be fingerprinted, the call bypasses the cache and gets an invocation
    /// of its own.
    pub fn call(&self, args: A) -> ResultHandle<T, E> {
        let inner = &self.inner;
        let Ok(runtime) = Handle::try_current() else {
            event!(Level::WARN, message = "called outside of a Tokio runtime", cache = %inner.name);
            return ResultHandle::failed(Error::NoRuntime);
        };

        let key = match inner.codec.key(&args) {
            Ok(key) => key,
            Err(error) => {
                event!(Level::WARN, message = "arguments cannot be fingerprinted, bypassing cache", cache = %inner.name, error = %error);
                let flight = Arc::new(Flight::new());
                let started = flight::start(|| (inner.func)(args));
                let shape = inner.shape;
                let task_flight = Arc::clone(&flight);
                runtime.spawn(async move { flight::drive(started, shape, &task_flight).await });
                return ResultHandle::new(flight);
            }
        };

        let (id, flight) = {
            let mut entries = inner.entries.lock();
            if let Some(entry) = entries.map.get(&key) {
                event!(Level::TRACE, message = "joining cached invocation", cache = %inner.name, key = %key, state = ?entry.flight.state());
                return ResultHandle::new(Arc::clone(&entry.flight));
            }

            let id = entries.next_id;
            entries.next_id += 1;
            let flight = Arc::new(Flight::new());
            entries.map.insert(
                key.clone(),
                Entry {
                    id,
                    flight: Arc::clone(&flight),
                    expiry: None,
                },
            );
            (id, flight)
        };

        // The lock is released before calling out so the wrapped function may re-enter the cache.
        event!(Level::DEBUG, message = "starting invocation", cache = %inner.name, entry = id);
        let started = flight::start(|| (inner.func)(args));

        let shape = inner.shape;
        let weak = Arc::downgrade(inner);
        let task_flight = Arc::clone(&flight);
        runtime.spawn(async move {
            flight::drive(started, shape, &task_flight).await;
            if let Some(inner) = weak.upgrade() {
                inner.schedule_expiry(key, id);
            }
        });

        ResultHandle::new(flight)
    }

    /// Turns the wrapper into a plain function.
    pub fn into_fn(self) -> impl Fn(A) -> ResultHandle<T, E> + Clone + Send + Sync + 'static {
        move |args| self.call(args)
    }

    /// Returns the state of the entry for `args`, if one is cached or in flight.
    #[must_use]
    pub fn state(&self, args: &A) -> Option<EntryState> {
        let key = self.inner.codec.key(args).ok()?;
        self.inner.entries.lock().map.get(&key).map(|entry| entry.flight.state())
    }

    /// Removes the entry for `args`, returning whether one existed.
    ///
    /// Callers already attached to the entry still receive its outcome; the next call for
    /// `args` invokes the wrapped function again.
    pub fn invalidate(&self, args: &A) -> bool {
        let Ok(key) = self.inner.codec.key(args) else {
            return false;
        };
        let removed = self.inner.entries.lock().map.remove(&key);
        if let Some(entry) = removed {
            event!(Level::DEBUG, message = "entry invalidated", cache = %self.inner.name, entry = entry.id);
            entry.cancel_expiry();
            true
        } else {
            false
        }
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let drained: Vec<_> = self.inner.entries.lock().map.drain().map(|(_, entry)| entry).collect();
        event!(Level::DEBUG, message = "cleared", cache = %self.inner.name, entries = drained.len());
        drained.into_iter().for_each(Entry::cancel_expiry);
    }
}

impl<A, T, E> Cacheable<A, T, E> {
    /// Returns the number of cached and in-flight entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().map.len()
    }

    /// Returns `true` if nothing is cached or in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the name of this instance.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns how long settled outcomes stay cached.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }
}

impl<A, T, E> Inner<A, T, E>
where
    A: 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn schedule_expiry(self: &Arc<Self>, key: String, id: u64) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.map.get_mut(&key) else {
            return;
        };
        if entry.id != id {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let ttl = self.ttl;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(&key, id);
            }
        });
        entry.expiry = Some(timer.abort_handle());
    }

    fn expire(&self, key: &str, id: u64) {
        let mut entries = self.entries.lock();
        if entries.map.get(key).is_some_and(|entry| entry.id == id) {
            entries.map.remove(key);
            drop(entries);
            event!(Level::DEBUG, message = "entry expired", cache = %self.name, entry = id);
        }
    }
}

impl<T, E> Entry<T, E> {
    fn cancel_expiry(self) {
        if let Some(expiry) = self.expiry {
            expiry.abort();
        }
    }
}

impl<A, T, E> Drop for Inner<A, T, E> {
    fn drop(&mut self) {
        self.entries.get_mut().map.drain().for_each(|(_, entry)| entry.cancel_expiry());
    }
}

impl<A, T, E> Clone for Cacheable<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T, E> Debug for Cacheable<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cacheable")
            .field("name", &self.inner.name)
            .field("ttl", &self.inner.ttl)
            .field("shape", &self.inner.shape)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}
