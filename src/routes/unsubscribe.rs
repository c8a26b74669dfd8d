use actix_web::{http::header::ContentType, web, HttpResponse};
use quick_xml::escape::escape;

use crate::store::{Store, StoreError};

/// Always answers with the confirmation page, whether or not the email was known.
#[tracing::instrument(name = "Unsubscribing", skip(store))]
pub async fn handle_unsubscribe(email: web::Path<String>, store: web::Data<dyn Store>) -> HttpResponse {
    let email = email.into_inner();

    match remove_subscriber(store.get_ref(), &email) {
        Ok(true) => tracing::info!("Removed subscriber {}", email),
        Ok(false) => tracing::info!("No subscriber with email {}", email),
        Err(err) => tracing::error!("Unsubscribe error: {:?}", err),
    }

    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(unsubscribed_page(&email))
}

/// Removes the record for `email`. Returns whether there was one.
pub fn remove_subscriber(store: &dyn Store, email: &str) -> Result<bool, StoreError> {
    let mut state = store.get();
    let before = state.subscribers.len();
    state
        .subscribers
        .retain(|subscriber| subscriber.email.as_ref() != email);

    if state.subscribers.len() == before {
        return Ok(false);
    }

    store.save(state)?;
    Ok(true)
}

fn unsubscribed_page(email: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Unsubscribed</title>
</head>
<body>
    <div class="container">
        <h1 class="success">✓ You're unsubscribed</h1>
        <p>The email address <span class="email">{}</span> has been removed from our mailing list.</p>
        <p>You will no longer receive emails from us.</p>
    </div>
</body>
</html>"#,
        escape(email)
    )
}
