// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Configuration of wrapper instances.

use std::borrow::Cow;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ResultShape;

const DEFAULT_NAME: &str = "memoflight";

/// Configuration of a [`Cacheable`](crate::Cacheable).
///
/// Options can be built in code or deserialized from configuration; missing fields take their
/// defaults.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use memoflight::{CacheOptions, ResultShape};
///
/// let options = CacheOptions::new()
///     .name("user_lookup")
///     .ttl(Duration::from_secs(30))
///     .shape(ResultShape::Future);
/// assert_eq!(options.ttl_value(), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    name: Cow<'static, str>,
    ttl: Duration,
    shape: ResultShape,
}

impl CacheOptions {
    /// Creates options with a zero TTL and an inferred result shape.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name used to identify this instance in log events.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets how long a settled outcome stays cached.
    ///
    /// A zero TTL still caches the outcome until the next scheduler turn after settlement, so
    /// callers attached while the invocation was in flight all share it.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Declares the result shape of the wrapped function.
    #[must_use]
    pub fn shape(mut self, shape: ResultShape) -> Self {
        self.shape = shape;
        self
    }

    /// Returns the configured name.
    #[must_use]
    pub fn name_value(&self) -> &str {
        &self.name
    }

    /// Returns the configured TTL.
    #[must_use]
    pub fn ttl_value(&self) -> Duration {
        self.ttl
    }

    /// Returns the declared result shape.
    #[must_use]
    pub fn shape_value(&self) -> ResultShape {
        self.shape
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            name: Cow::Borrowed(DEFAULT_NAME),
            ttl: Duration::ZERO,
            shape: ResultShape::Infer,
        }
    }
}

/// Configuration of a [`TimeSlice`](crate::TimeSlice).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use memoflight::TimeSliceOptions;
///
/// let options = TimeSliceOptions::new().name("search").window(Duration::from_millis(250));
/// assert_eq!(options.window_value(), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSliceOptions {
    name: Cow<'static, str>,
    window: Duration,
    shape: ResultShape,
}

impl TimeSliceOptions {
    /// Creates options with a zero window and an inferred result shape.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name used to identify this instance in log events.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets how long a window stays open before the wrapped function is invoked.
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Declares the result shape of the wrapped function.
    #[must_use]
    pub fn shape(mut self, shape: ResultShape) -> Self {
        self.shape = shape;
        self
    }

    /// Returns the configured name.
    #[must_use]
    pub fn name_value(&self) -> &str {
        &self.name
    }

    /// Returns the configured window.
    #[must_use]
    pub fn window_value(&self) -> Duration {
        self.window
    }

    /// Returns the declared result shape.
    #[must_use]
    pub fn shape_value(&self) -> ResultShape {
        self.shape
    }
}

impl Default for TimeSliceOptions {
    fn default() -> Self {
        Self {
            name: Cow::Borrowed(DEFAULT_NAME),
            window: Duration::ZERO,
            shape: ResultShape::Infer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = CacheOptions::default();
        assert_eq!(options.name_value(), "memoflight");
        assert_eq!(options.ttl_value(), Duration::ZERO);
        assert_eq!(options.shape_value(), ResultShape::Infer);

        let options = TimeSliceOptions::default();
        assert_eq!(options.name_value(), "memoflight");
        assert_eq!(options.window_value(), Duration::ZERO);
        assert_eq!(options.shape_value(), ResultShape::Infer);
    }

    #[test]
    fn partial_config_documents() {
        let options: CacheOptions = serde_json::from_str(r#"{ "name": "users", "ttl": { "secs": 5, "nanos": 0 } }"#)
            .unwrap_or_default();
        assert_eq!(options, CacheOptions::new().name("users").ttl(Duration::from_secs(5)));

        let options: TimeSliceOptions = serde_json::from_str(r#"{ "shape": "stream" }"#).unwrap_or_default();
        assert_eq!(options, TimeSliceOptions::new().shape(ResultShape::Stream));
    }

    #[test]
    fn serialized_options_round_trip() {
        let options = TimeSliceOptions::new().name("search").window(Duration::from_millis(250));
        let text = serde_json::to_string(&options).unwrap_or_default();
        let parsed: TimeSliceOptions = serde_json::from_str(&text).unwrap_or_default();
        assert_eq!(parsed, options);
    }
}
