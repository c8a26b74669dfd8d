use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::http::StatusCode;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use secrecy::{ExposeSecret, Secret};
use std::future::{ready, Ready};

use crate::feeds::FeedItem;
use crate::mailout::Mailer;
use crate::store::Store;

/// The shared secret admin requests must carry. `None` locks the admin routes.
pub struct AdminPassword(pub Option<Secret<String>>);

/// Proof that the request carried the admin password. Taking it as a handler
/// argument is what guards a route.
pub struct Admin;

impl FromRequest for Admin {
    type Error = AdminAuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authorize(req))
    }
}

fn authorize(req: &HttpRequest) -> Result<Admin, AdminAuthError> {
    let password = req
        .app_data::<web::Data<AdminPassword>>()
        .and_then(|password| password.0.as_ref())
        .ok_or(AdminAuthError::NotConfigured)?;

    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AdminAuthError::MissingOrWrongPassword)?;

    if provided != password.expose_secret() {
        return Err(AdminAuthError::MissingOrWrongPassword);
    }

    Ok(Admin)
}

#[derive(thiserror::Error)]
pub enum AdminAuthError {
    #[error("Admin password not configured")]
    NotConfigured,
    #[error("Authorization header required")]
    MissingOrWrongPassword,
}

impl std::fmt::Debug for AdminAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

impl ResponseError for AdminAuthError {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        tracing::warn!("Rejected admin request: {}", self);
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}

#[tracing::instrument(name = "Dumping the store", skip_all)]
pub async fn get_db(_: Admin, store: web::Data<dyn Store>) -> HttpResponse {
    HttpResponse::Ok().json(store.get_ref().get())
}

#[tracing::instrument(name = "Sending a test email", skip(store, mailer, _admin))]
pub async fn send_test_email(
    _admin: Admin,
    email: web::Path<String>,
    store: web::Data<dyn Store>,
    mailer: web::Data<Mailer>,
) -> Result<HttpResponse, TestEmailError> {
    let subscriber = store
        .get_ref()
        .get()
        .find_subscriber(&email)
        .cloned()
        .ok_or(TestEmailError::SubscriberNotFound)?;

    let test_post = FeedItem {
        title: "Test email".to_string(),
        link: "https://example.org/".to_string(),
        published: None,
    };
    let report = mailer.dispatch(&[subscriber], &[test_post]).await;

    if report.has_failures() {
        return Err(TestEmailError::SendFailed);
    }

    let message = if report.dry_run > 0 {
        "Dry run: no mail API key configured, test email only logged"
    } else {
        "Test email sent successfully"
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "message": message
    })))
}

#[derive(thiserror::Error)]
pub enum TestEmailError {
    #[error("Subscriber not found")]
    SubscriberNotFound,
    #[error("Failed to send test email")]
    SendFailed,
}

impl std::fmt::Debug for TestEmailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

impl ResponseError for TestEmailError {
    fn status_code(&self) -> StatusCode {
        match self {
            TestEmailError::SubscriberNotFound => StatusCode::NOT_FOUND,
            TestEmailError::SendFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}
