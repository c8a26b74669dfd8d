use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_aux::field_attributes::deserialize_string_from_number;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::new_subscriber::NewSubscriber;
use crate::domain::subscriber_email::SubscriberEmail;

/// A subscriber record as it is persisted in the store file.
///
/// Older deployments stored `name`, `source` and `meta` exactly as the client
/// sent them, so those fields accept any JSON on load.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    #[serde(deserialize_with = "deserialize_string_from_number")]
    pub id: String,
    pub email: SubscriberEmail,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_text"
    )]
    pub name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_text"
    )]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "object_or_empty")]
    pub meta: Map<String, Value>,
    pub subscribed_at: DateTime<Utc>,
    // Only written by older deployments, which flagged instead of removing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl Subscriber {
    pub fn is_active(&self) -> bool {
        self.active != Some(false)
    }
}

/// Strings are kept, numbers and booleans become their text, anything else is dropped.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

fn object_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(meta) => Ok(meta),
        _ => Ok(Map::new()),
    }
}

impl From<NewSubscriber> for Subscriber {
    fn from(new_subscriber: NewSubscriber) -> Self {
        Subscriber {
            id: Uuid::new_v4().to_string(),
            email: new_subscriber.email,
            name: new_subscriber.name.map(|name| name.into_inner()),
            source: new_subscriber.source,
            meta: new_subscriber.meta,
            subscribed_at: Utc::now(),
            active: None,
        }
    }
}
