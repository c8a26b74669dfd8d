//! Turning new posts into one personalized email per subscriber.

mod template;

use futures::stream::{self, StreamExt};

use crate::config::MailoutSettings;
use crate::domain::subscriber::Subscriber;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::email_client::{Delivery, EmailClient};
use crate::feeds::FeedItem;
use template::TemplateData;

/// Upper bound on sends in flight at the same time.
const MAX_CONCURRENT_SENDS: usize = 10;

/// A rendered message for one recipient.
#[derive(Debug, Clone)]
pub struct Mailout {
    pub recipient: SubscriberEmail,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Outcome of a batch. Failures are listed by recipient; they never abort the batch.
#[derive(Debug, Default, PartialEq)]
pub struct DispatchReport {
    pub sent: usize,
    pub dry_run: usize,
    pub failed: Vec<String>,
}

impl DispatchReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

pub struct Mailer {
    email_client: EmailClient,
    settings: MailoutSettings,
    base_url: String,
}

impl Mailer {
    pub fn new(email_client: EmailClient, settings: MailoutSettings, base_url: String) -> Self {
        Mailer {
            email_client,
            settings,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn unsubscribe_url(&self, email: &SubscriberEmail) -> String {
        format!("{}/unsubscribe/{}", self.base_url, email)
    }

    /// Renders the new-posts email for one subscriber.
    pub fn compose(&self, subscriber: &Subscriber, posts: &[FeedItem]) -> Mailout {
        let unsubscribe_url = self.unsubscribe_url(&subscriber.email);
        let data = TemplateData {
            posts,
            subscriber_name: subscriber.name.as_deref(),
            unsubscribe_url: &unsubscribe_url,
            new_post_text: &self.settings.new_post_text,
            favicon_url: self.settings.favicon_url.as_deref(),
            admin_contact: self.settings.admin_contact.as_deref(),
        };

        Mailout {
            recipient: subscriber.email.clone(),
            subject: self.settings.new_post_text.clone(),
            html: template::render_html(&data),
            text: template::render_text(&data),
        }
    }

    pub fn compose_welcome(&self, subscriber: &Subscriber) -> Mailout {
        let unsubscribe_url = self.unsubscribe_url(&subscriber.email);
        let name = subscriber.name.as_deref();

        Mailout {
            recipient: subscriber.email.clone(),
            subject: self.settings.welcome_subject.clone(),
            html: template::render_welcome_html(name, &unsubscribe_url),
            text: template::render_welcome_text(name, &unsubscribe_url),
        }
    }

    /// Sends `posts` to every subscriber in `subscribers`.
    #[tracing::instrument(
        name = "Dispatching a mailout",
        skip_all,
        fields(subscribers = subscribers.len(), posts = posts.len())
    )]
    pub async fn dispatch(&self, subscribers: &[Subscriber], posts: &[FeedItem]) -> DispatchReport {
        let mailouts = subscribers
            .iter()
            .map(|subscriber| self.compose(subscriber, posts))
            .collect();

        self.send_batch(mailouts).await
    }

    #[tracing::instrument(name = "Sending a welcome email", skip_all, fields(subscriber_email = %subscriber.email))]
    pub async fn send_welcome(&self, subscriber: &Subscriber) -> Result<Delivery, reqwest::Error> {
        let mailout = self.compose_welcome(subscriber);

        self.send(&mailout).await
    }

    /// Sends every mailout, at most [`MAX_CONCURRENT_SENDS`] at a time.
    pub async fn send_batch(&self, mailouts: Vec<Mailout>) -> DispatchReport {
        let results: Vec<(SubscriberEmail, Result<Delivery, reqwest::Error>)> = stream::iter(mailouts)
            .map(|mailout| async move {
                let result = self.send(&mailout).await;
                (mailout.recipient, result)
            })
            .buffer_unordered(MAX_CONCURRENT_SENDS)
            .collect()
            .await;

        let mut report = DispatchReport::default();
        for (recipient, result) in results {
            match result {
                Ok(Delivery::Sent) => report.sent += 1,
                Ok(Delivery::DryRun) => report.dry_run += 1,
                Err(err) => {
                    tracing::error!("Failed to send email to {}: {:?}", recipient, err);
                    report.failed.push(recipient.to_string());
                }
            }
        }

        report
    }

    async fn send(&self, mailout: &Mailout) -> Result<Delivery, reqwest::Error> {
        self.email_client
            .send_email(&mailout.recipient, &mailout.subject, &mailout.html, &mailout.text)
            .await
    }
}
