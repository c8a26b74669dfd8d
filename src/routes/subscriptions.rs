use actix_web::{web, Either, HttpResponse, Responder};

use crate::{
    domain::{
        new_subscriber::{NewSubscriber, SubscribeBody},
        subscriber::Subscriber,
    },
    mailout::Mailer,
    routes::ApiMessage,
    store::{Store, StoreError},
};

/// Accepts the body as JSON or, for plain HTML forms, urlencoded.
#[tracing::instrument(
    name = "Creating a new subscriber handler",
    skip(body, store, mailer),
    fields(
        subscriber_email = tracing::field::Empty,
        subscriber_source = tracing::field::Empty
    )
)]
pub async fn handle_subscribe(
    body: Either<web::Json<SubscribeBody>, web::Form<SubscribeBody>>,
    store: web::Data<dyn Store>,
    mailer: web::Data<Mailer>,
) -> impl Responder {
    let body = match body {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    };
    let span = tracing::Span::current();
    span.record("subscriber_email", tracing::field::debug(&body.email));
    span.record("subscriber_source", tracing::field::debug(&body.source));

    let new_subscriber: NewSubscriber = match body.try_into() {
        Ok(subscriber) => subscriber,
        Err(err) => {
            tracing::error!("Validation error: {:?}", err);
            return HttpResponse::BadRequest().json(ApiMessage::error(err));
        }
    };

    let subscriber = match insert_subscriber(store.get_ref(), new_subscriber) {
        Ok(Some(subscriber)) => subscriber,
        Ok(None) => {
            tracing::info!("Already subscribed, nothing to do");
            return HttpResponse::Created().json(ApiMessage::subscribed());
        }
        Err(err) => {
            tracing::error!("Failed to store new subscriber: {:?}", err);
            return HttpResponse::InternalServerError().json(ApiMessage::internal_error());
        }
    };

    tracing::info!("Subscribed new user {}", subscriber.email);

    if let Err(err) = mailer.send_welcome(&subscriber).await {
        tracing::error!(
            "Failed to send a welcome email to {}: {:?}",
            subscriber.email,
            err
        );
    }

    HttpResponse::Created().json(ApiMessage::subscribed())
}

/// Adds the subscriber unless the email is already known.
/// Returns the new record, or `None` for a duplicate.
#[tracing::instrument(
    name = "Insert a new subscriber into the store",
    skip(store, new_subscriber)
)]
pub fn insert_subscriber(
    store: &dyn Store,
    new_subscriber: NewSubscriber,
) -> Result<Option<Subscriber>, StoreError> {
    let mut state = store.get();

    if state
        .find_subscriber(new_subscriber.email.as_ref())
        .is_some()
    {
        return Ok(None);
    }

    let subscriber = Subscriber::from(new_subscriber);
    state.subscribers.push(subscriber.clone());
    store.save(state)?;

    Ok(Some(subscriber))
}
