use serde::Deserialize;

use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_name::SubscriberName;

#[derive(Debug)]
pub struct NewSubscriber {
    pub email: SubscriberEmail,
    pub name: Option<SubscriberName>,
    pub source: Option<String>,
    pub meta: serde_json::Map<String, serde_json::Value>,
}

/// Every field is optional so that a missing email ends up as our own 400 body
/// rather than the extractor's plain text error. Read from JSON or from a
/// urlencoded form.
#[derive(Deserialize, Debug)]
pub struct SubscribeBody {
    pub email: Option<String>,
    pub name: Option<String>,
    pub source: Option<String>,
    pub meta: Option<serde_json::Value>,
}

impl TryFrom<SubscribeBody> for NewSubscriber {
    type Error = String;

    fn try_from(body: SubscribeBody) -> Result<Self, Self::Error> {
        let email = match body.email {
            Some(email) if !email.is_empty() => email,
            _ => return Err("Missing required fields: email is required".to_string()),
        };
        let email = SubscriberEmail::parse(email).map_err(|_| "Invalid email format".to_string())?;
        let name = body.name.map(SubscriberName::parse).transpose()?;
        // Anything that is not a JSON object is dropped, like an absent meta.
        let meta = match body.meta {
            Some(serde_json::Value::Object(meta)) => meta,
            _ => serde_json::Map::new(),
        };

        Ok(NewSubscriber {
            email,
            name,
            source: body.source,
            meta,
        })
    }
}
