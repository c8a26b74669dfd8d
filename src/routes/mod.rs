mod admin;
mod heartbeat;
mod subscriptions;
mod unsubscribe;

pub use admin::{get_db, send_test_email, Admin, AdminAuthError, AdminPassword, TestEmailError};
pub use heartbeat::{heartbeat, StartedAt};
pub use subscriptions::{handle_subscribe, insert_subscriber};
pub use unsubscribe::{handle_unsubscribe, remove_subscriber};

/// Body of the public JSON answers: `{ "status": ..., "message": ... }`.
#[derive(serde::Serialize, Debug)]
pub struct ApiMessage {
    pub status: &'static str,
    pub message: String,
}

impl ApiMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ApiMessage {
            status: "error",
            message: message.into(),
        }
    }

    pub fn subscribed() -> Self {
        ApiMessage {
            status: "success",
            message: "Successfully subscribed".to_string(),
        }
    }

    pub fn internal_error() -> Self {
        ApiMessage::error("Internal server error")
    }
}
