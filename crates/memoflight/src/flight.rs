// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The normalized outcome of one underlying invocation.
//!
//! A [`Flight`] records every value an invocation produced plus its terminal state, and
//! replays that record to any number of subscribers, whether they attach before or after the
//! invocation settles. Both the cache and the throttle hand out subscriptions to flights.

use std::panic::AssertUnwindSafe;
use std::pin::pin;

use futures_util::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::panic_message;
use crate::{Error, Producer, ResultShape};

/// Observable state of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// The invocation has not settled yet.
    Pending,
    /// The invocation completed successfully.
    Settled,
    /// The invocation failed; the failure is replayed to every caller.
    Failed,
}

enum End<E> {
    Completed,
    Failed(Error<E>),
}

struct Record<T, E> {
    values: Vec<T>,
    end: Option<End<E>>,
}

pub(crate) struct Flight<T, E> {
    record: Mutex<Record<T, E>>,
    settled: Notify,
}

impl<T, E> Flight<T, E> {
    pub(crate) fn new() -> Self {
        Self {
            record: Mutex::new(Record {
                values: Vec::new(),
                end: None,
            }),
            settled: Notify::new(),
        }
    }

    pub(crate) fn failed(error: Error<E>) -> Self {
        let flight = Self::new();
        flight.finish(End::Failed(error));
        flight
    }

    pub(crate) fn state(&self) -> EntryState {
        match self.record.lock().end {
            None => EntryState::Pending,
            Some(End::Completed) => EntryState::Settled,
            Some(End::Failed(_)) => EntryState::Failed,
        }
    }

    fn push(&self, value: T) {
        let mut record = self.record.lock();
        if record.end.is_none() {
            record.values.push(value);
        }
        drop(record);
        self.settled.notify_waiters();
    }

    fn finish(&self, end: End<E>) {
        let mut record = self.record.lock();
        if record.end.is_none() {
            record.end = Some(end);
        }
        drop(record);
        self.settled.notify_waiters();
    }
}

impl<T: Clone, E: Clone> Flight<T, E> {
    /// Waits for the item at `index`: `Some(Ok)` for a value, `Some(Err)` for the failure that
    /// ended the flight, `None` once the flight completed with fewer values.
    pub(crate) async fn item(&self, index: usize) -> Option<Result<T, Error<E>>> {
        loop {
            // Registered before inspecting the record so a concurrent push is never missed.
            let mut notified = pin!(self.settled.notified());
            notified.as_mut().enable();

            {
                let record = self.record.lock();
                if let Some(value) = record.values.get(index) {
                    return Some(Ok(value.clone()));
                }
                match &record.end {
                    Some(End::Completed) => return None,
                    Some(End::Failed(error)) => return Some(Err(error.clone())),
                    None => {}
                }
            }

            notified.await;
        }
    }

    /// Waits for the flight to end and returns its terminal value.
    pub(crate) async fn terminal(&self) -> Result<T, Error<E>> {
        loop {
            let mut notified = pin!(self.settled.notified());
            notified.as_mut().enable();

            {
                let record = self.record.lock();
                match &record.end {
                    Some(End::Completed) => return record.values.last().cloned().ok_or(Error::Empty),
                    Some(End::Failed(error)) => return Err(error.clone()),
                    None => {}
                }
            }

            notified.await;
        }
    }
}

/// Calls `invoke`, catching a synchronous panic.
pub(crate) fn start<T, E>(invoke: impl FnOnce() -> Producer<T, E>) -> Result<Producer<T, E>, Error<E>> {
    std::panic::catch_unwind(AssertUnwindSafe(invoke)).map_err(|payload| Error::Panicked(panic_message(payload.as_ref())))
}

/// Drives a started invocation to its end, recording everything it produces into `flight`.
pub(crate) async fn drive<T, E>(started: Result<Producer<T, E>, Error<E>>, declared: ResultShape, flight: &Flight<T, E>) {
    let producer = match started {
        Ok(producer) => producer,
        Err(error) => return flight.finish(End::Failed(error)),
    };

    let actual = producer.shape();
    if !declared.accepts(actual) {
        return flight.finish(End::Failed(Error::ShapeMismatch { declared, actual }));
    }

    let end = AssertUnwindSafe(record(producer, flight))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| End::Failed(Error::Panicked(panic_message(payload.as_ref()))));
    flight.finish(end);
}

async fn record<T, E>(producer: Producer<T, E>, flight: &Flight<T, E>) -> End<E> {
    match producer {
        Producer::Future(future) => match future.await {
            Ok(value) => {
                flight.push(value);
                End::Completed
            }
            Err(error) => End::Failed(Error::Invocation(error)),
        },
        Producer::Stream(mut stream) => {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(value) => flight.push(value),
                    Err(error) => return End::Failed(Error::Invocation(error)),
                }
            }
            End::Completed
        }
    }
}
