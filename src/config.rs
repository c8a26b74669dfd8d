use config::{Config, ConfigError, File};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_aux::field_attributes::{
    deserialize_number_from_string, deserialize_option_number_from_string,
};
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::subscriber_email::SubscriberEmail;

#[derive(Debug)]
pub enum Environment {
    Development,
    Production,
}

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub store: StoreSettings,
    pub feeds: FeedSettings,
    pub email_client: EmailClientSettings,
    pub mailout: MailoutSettings,
    #[serde(default)]
    pub admin: AdminSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    /// Public root of this service, used for unsubscribe links.
    pub base_url: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct StoreSettings {
    pub path: PathBuf,
}

#[derive(serde::Deserialize, Clone)]
pub struct FeedSettings {
    /// Either a list or a single comma separated string.
    #[serde(default, deserialize_with = "deserialize_feed_urls")]
    pub urls: Vec<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub poll_interval_minutes: u64,
    #[serde(default)]
    pub allow_invalid_certs: bool,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub timeout_seconds: Option<u64>,
}

#[derive(serde::Deserialize, Clone)]
pub struct EmailClientSettings {
    pub base_url: String,
    pub domain: String,
    pub sender_email: String,
    // secrecy keeps the key out of logs; no key means dry-run
    pub api_key: Option<Secret<String>>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct MailoutSettings {
    pub new_post_text: String,
    pub welcome_subject: String,
    pub favicon_url: Option<String>,
    pub admin_contact: Option<String>,
}

#[derive(serde::Deserialize, Clone, Default)]
pub struct AdminSettings {
    pub password: Option<Secret<String>>,
}

impl Settings {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    pub fn set_app_port(&mut self, port: u16) {
        self.application.port = port;
    }
}

impl FeedSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes * 60)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

impl EmailClientSettings {
    pub fn get_sender_email(&self) -> Result<SubscriberEmail, String> {
        SubscriberEmail::parse(self.sender_email.clone())
    }

    /// The API key, unless it is missing or blank.
    pub fn get_api_key(&self) -> Option<Secret<String>> {
        non_blank(&self.api_key)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }
}

impl AdminSettings {
    /// The admin password, unless it is missing or blank.
    pub fn get_password(&self) -> Option<Secret<String>> {
        non_blank(&self.password)
    }
}

fn non_blank(secret: &Option<Secret<String>>) -> Option<Secret<String>> {
    secret
        .as_ref()
        .filter(|secret| !secret.expose_secret().trim().is_empty())
        .cloned()
}

fn deserialize_feed_urls<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FeedUrls {
        List(Vec<String>),
        Joined(String),
    }

    let urls = match FeedUrls::deserialize(deserializer)? {
        FeedUrls::List(urls) => urls,
        FeedUrls::Joined(joined) => joined.split(',').map(String::from).collect(),
    };

    Ok(urls
        .into_iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect())
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            unknown_env => Err(format!(
                "{} is not supported environment. Use either 'development' or 'production'.",
                unknown_env
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let root_path = std::env::current_dir().map_err(|err| {
        ConfigError::Message(format!("Failed to determine the current directory: {}", err))
    })?;
    let config_directory = root_path.join("config");
    // Uses development environment by default
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "development".into())
        .try_into()
        .map_err(ConfigError::Message)?;
    let config_base_filepath = config_directory.join("base");
    let config_env_filepath = config_directory.join(environment.as_str());

    // It merges the base configuration file with the one from the specific environment (development or production)
    let settings = Config::builder()
        .add_source(File::from(config_base_filepath).required(true))
        .add_source(File::from(config_env_filepath).required(true))
        // Merge settings from environment variables with a prefix of APP and "__" separator
        // E.g APP_FEEDS__URLS would set Settings.feeds.urls
        .add_source(config::Environment::with_prefix("app").separator("__"))
        .build()?;

    tracing::info!("Application environment = {:?}", environment);

    // Try to convert the value from the configuration file into a Settings type
    settings.try_deserialize()
}
