// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Time-windowed de-duplication of stream items.

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use futures_util::Stream;
use pin_project_lite::pin_project;
use serde::Serialize;
use tokio::time::Instant;

use crate::{JsonKeyCodec, KeyCodec};

pin_project! {
    /// Stream returned by [`DistinctTimeExt::distinct_time`].
    #[derive(Debug)]
    #[must_use = "streams do nothing unless polled"]
    pub struct DistinctTime<S> {
        #[pin]
        stream: S,
        window: Duration,
        // Key of every forwarded item mapped to the last instant it suppresses duplicates;
        // `None` never expires.
        seen: HashMap<String, Option<Instant>>,
    }
}

impl<S> Stream for DistinctTime<S>
where
    S: Stream,
    S::Item: Serialize,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            let Some(item) = ready!(this.stream.as_mut().poll_next(cx)) else {
                return Poll::Ready(None);
            };

            let Ok(key) = JsonKeyCodec::new().key(&item) else {
                return Poll::Ready(Some(item));
            };

            let now = Instant::now();
            this.seen.retain(|_, until| until.is_none_or(|until| until >= now));
            if this.seen.contains_key(&key) {
                continue;
            }

            this.seen.insert(key, now.checked_add(*this.window));
            return Poll::Ready(Some(item));
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.stream.size_hint().1)
    }
}

/// Extension for dropping repeated stream items within a time window.
pub trait DistinctTimeExt: Stream {
    /// Forwards an item only if no structurally equal item was forwarded within the last
    /// `window`.
    ///
    /// Items are compared by their [`JsonKeyCodec`] key. A suppressed duplicate does not extend
    /// the window started by the forwarded item. An entry expires only once the clock has
    /// moved past the end of its window, so a zero window still drops duplicates that arrive
    /// at the same instant. Items that cannot be serialized are always forwarded. Time is read
    /// from the Tokio clock.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use futures_util::{StreamExt, stream};
    /// use memoflight::DistinctTimeExt;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let items: Vec<_> = stream::iter(["a", "b", "a", "c", "b"])
    ///     .distinct_time(Duration::from_secs(1))
    ///     .collect()
    ///     .await;
    /// assert_eq!(items, ["a", "b", "c"]);
    /// # }
    /// ```
    fn distinct_time(self, window: Duration) -> DistinctTime<Self>
    where
        Self: Sized,
        Self::Item: Serialize,
    {
        DistinctTime {
            stream: self,
            window,
            seen: HashMap::new(),
        }
    }
}

impl<S: Stream + ?Sized> DistinctTimeExt for S {}
