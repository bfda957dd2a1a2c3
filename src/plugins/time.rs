//! Wall clock plugin.

use chrono::{DateTime, Local, TimeZone};
use serde_json::json;

use super::KernelPlugin;
use crate::capabilities::{Capability, ReturnSpec, ValueType};

/// Plugin exposing `get_time` under the `Time` namespace.
#[derive(Debug, Clone, Default)]
pub struct TimePlugin;

impl TimePlugin {
    pub const NAMESPACE: &'static str = "Time";

    pub fn new() -> Self {
        Self
    }
}

/// Format a time as `HH:MM AM/PM`.
pub fn format_clock<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format("%I:%M %p").to_string()
}

impl KernelPlugin for TimePlugin {
    fn namespace(&self) -> &str {
        Self::NAMESPACE
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::builder(Self::NAMESPACE, "get_time")
            .description("Gets the current local time")
            .returns(ReturnSpec::of(ValueType::String))
            .handler(|_| Ok(json!(format_clock(&Local::now()))))]
    }
}
