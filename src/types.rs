//! Small shared serialization helpers for result types.

use serde::Serializer;
use std::fmt::Display;
use std::time::Duration;

/// Serializes a `Duration` as whole milliseconds.
pub fn serialize_duration_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    serializer.serialize_u64(millis)
}

/// Serializes any displayable value (typically an error) as its message.
pub fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Display,
    S: Serializer,
{
    serializer.collect_str(value)
}
