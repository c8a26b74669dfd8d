use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use std::time;

use crate::domain::subscriber_email::SubscriberEmail;

const REQUEST_TIMEOUT: time::Duration = time::Duration::from_secs(10);

/// Client for the Mailgun messages API.
///
/// Without an API key the client runs dry: messages are logged, never sent.
pub struct EmailClient {
    http_client: Client,
    base_url: String,
    domain: String,
    sender: SubscriberEmail,
    api_key: Option<Secret<String>>,
}

/// What happened to a message that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    DryRun,
}

#[derive(serde::Serialize, Debug)]
struct MailgunMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        domain: String,
        sender: SubscriberEmail,
        api_key: Option<Secret<String>>,
        timeout: Option<time::Duration>,
    ) -> Result<EmailClient, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
            .build()?;

        Ok(EmailClient {
            http_client,
            base_url,
            domain,
            sender,
            api_key,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        self.api_key.is_none()
    }

    #[tracing::instrument(
        name = "Sending an email",
        skip(self, subject, html_content, text_content),
        fields(recipient = %recipient)
    )]
    pub async fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_content: &str,
        text_content: &str,
    ) -> Result<Delivery, reqwest::Error> {
        let message = MailgunMessage {
            from: self.sender.as_ref(),
            to: recipient.as_ref(),
            subject,
            text: text_content,
            html: html_content,
        };

        let api_key = match &self.api_key {
            Some(api_key) => api_key,
            None => {
                tracing::info!("No mail API key configured, not sending: {:?}", message);
                return Ok(Delivery::DryRun);
            }
        };

        let url = format!("{}/v3/{}/messages", self.base_url, self.domain);

        self.http_client
            .post(&url)
            .basic_auth("api", Some(api_key.expose_secret()))
            .form(&message)
            .send()
            .await?
            .error_for_status()?; // return an error when server response status code is 4xx or 5xx

        tracing::info!("Sent email to {}", recipient);

        Ok(Delivery::Sent)
    }
}
