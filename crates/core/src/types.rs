//! Wire payloads posted to the collection endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event name used when the caller does not supply one.
pub const PAGEVIEW: &str = "pageview";

/// A single caller-supplied value attached to an event or identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    /// Serialized as an RFC 3339 string.
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl From<bool> for EventValue {
    fn from(value: bool) -> Self {
        EventValue::Bool(value)
    }
}

impl From<i64> for EventValue {
    fn from(value: i64) -> Self {
        EventValue::Integer(value)
    }
}

impl From<i32> for EventValue {
    fn from(value: i32) -> Self {
        EventValue::Integer(value.into())
    }
}

impl From<f64> for EventValue {
    fn from(value: f64) -> Self {
        EventValue::Float(value)
    }
}

impl From<DateTime<Utc>> for EventValue {
    fn from(value: DateTime<Utc>) -> Self {
        EventValue::Timestamp(value)
    }
}

impl From<String> for EventValue {
    fn from(value: String) -> Self {
        EventValue::Text(value)
    }
}

impl From<&str> for EventValue {
    fn from(value: &str) -> Self {
        EventValue::Text(value.to_string())
    }
}

/// Arbitrary key/value data supplied with an event.
pub type EventData = BTreeMap<String, EventValue>;

/// Data supplied with `identify`. The well-known profile fields sit next to
/// any custom keys in the same JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(flatten)]
    pub extra: EventData,
}

impl IdentityData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<EventValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Body of `POST {endpoint}/event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// `"{width}x{height}"`
    pub screen: String,
    pub language: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EventData>,
}

/// Body of `POST {endpoint}/identify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityPayload {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<IdentityData>,
}
