// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Coalescing caches and time-sliced throttles for async producers.
//!
//! This crate wraps a function that returns an asynchronous result, either a single future
//! value or a stream of values, and cuts down on how often that function actually runs:
//!
//! - [`Cacheable`] coalesces calls by argument fingerprint. At most one invocation per key is
//!   in flight, and its outcome (value or error) is kept for a configurable TTL after it
//!   settles.
//! - [`TimeSlice`] merges every call made within a time window into one invocation that uses
//!   the arguments of the most recent call.
//! - [`DistinctTimeExt::distinct_time`] drops stream items equal to one already seen within a
//!   time window.
//!
//! Both wrappers hand out a [`ResultHandle`], which can be awaited for a single value or
//! turned into a [`Subscription`] stream, regardless of the shape the wrapped function
//! produces.
//!
//! # Examples
//!
//! ## Coalescing cache
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use memoflight::{CacheOptions, Producer, cacheable};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let calls = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&calls);
//! let fetch = cacheable(
//!     move |path: String| {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!         Producer::future(async move { Ok::<_, String>(path.len()) })
//!     },
//!     CacheOptions::new().ttl(Duration::from_secs(30)),
//! );
//!
//! let (a, b) = tokio::join!(fetch.call("/index.html".to_string()), fetch.call("/index.html".to_string()));
//! assert_eq!(a, b);
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//! # }
//! ```
//!
//! ## Stream-shaped results
//!
//! ```
//! use futures_util::{StreamExt, stream};
//! use memoflight::{CacheOptions, Producer, ResultShape, cacheable};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pages = cacheable(
//!     |count: u32| Producer::stream(stream::iter((1..=count).map(Ok::<_, String>))),
//!     CacheOptions::new().shape(ResultShape::Stream),
//! );
//!
//! let all: Vec<_> = pages.call(3).into_stream().collect().await;
//! assert_eq!(all, vec![Ok(1), Ok(2), Ok(3)]);
//!
//! // Awaited directly, a stream resolves with its last value.
//! assert_eq!(pages.call(3).await, Ok(3));
//! # }
//! ```
//!
//! # Runtime
//!
//! Invocations, expiry timers and window timers run as Tokio tasks on the runtime the call is
//! made from. Tests can drive them deterministically with Tokio's paused clock.
//!
//! # Logging
//!
//! The crate emits [`tracing`] events: invocation starts, expiries and window transitions at
//! `DEBUG`, callers joining existing work at `TRACE`, and degraded calls at `WARN`.

mod cacheable;
mod distinct;
mod error;
mod flight;
mod handle;
mod key;
mod options;
mod shape;
mod time_slice;

#[doc(inline)]
pub use cacheable::Cacheable;
#[doc(inline)]
pub use distinct::{DistinctTime, DistinctTimeExt};
#[doc(inline)]
pub use error::Error;
#[doc(inline)]
pub use flight::EntryState;
#[doc(inline)]
pub use handle::{ResultHandle, Subscription};
#[doc(inline)]
pub use key::{JsonKeyCodec, KeyCodec, KeyError, KeyFn};
#[doc(inline)]
pub use options::{CacheOptions, TimeSliceOptions};
#[doc(inline)]
pub use shape::{Producer, ResultShape};
#[doc(inline)]
pub use time_slice::TimeSlice;

/// Wraps `func` in a [`Cacheable`] that fingerprints arguments as JSON.
pub fn cacheable<A, T, E, F>(func: F, options: CacheOptions) -> Cacheable<A, T, E>
where
    A: serde::Serialize + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(A) -> Producer<T, E> + Send + Sync + 'static,
{
    Cacheable::new(func, options)
}

/// Wraps `func` in a [`TimeSlice`].
pub fn time_slice<A, T, E, F>(func: F, options: TimeSliceOptions) -> TimeSlice<A, T, E>
where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(A) -> Producer<T, E> + Send + Sync + 'static,
{
    TimeSlice::new(func, options)
}
