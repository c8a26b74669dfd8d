use chrono::Utc;
use reqwest::Response;
use secrecy::Secret;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use tempfile::TempDir;
use uuid::Uuid;
use wiremock::MockServer;

use feed_mailer::{
    config::get_configuration,
    domain::{subscriber::Subscriber, subscriber_email::SubscriberEmail},
    poller::Poller,
    startup::Application,
    store::{JsonFileStore, MailerState, Store},
    telemetry::{get_subscriber, init_subscriber},
};

pub const ADMIN_PASSWORD: &str = "let-me-in";
pub const MAIL_DOMAIN: &str = "mg.example.com";

// Logs are swallowed unless TEST_LOG is set
static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber("test".into(), "debug".into(), std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber("test".into(), "debug".into(), std::io::sink);
        init_subscriber(subscriber);
    }
});

#[derive(Default)]
pub struct TestAppOptions {
    /// Paths served by `feed_server`, in the order they are polled.
    pub feed_paths: Vec<&'static str>,
    /// Emails already subscribed when the app starts.
    pub subscribers: Vec<&'static str>,
    /// Leave the mail API key out so every send is only logged.
    pub dry_run: bool,
    pub no_admin_password: bool,
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub email_server: MockServer,
    pub feed_server: MockServer,
    pub poller: Arc<Poller>,
    pub store_path: PathBuf,
    // Removed on drop, so it has to live as long as the app
    _data_dir: TempDir,
}

pub fn subscriber(email: &str) -> Subscriber {
    Subscriber {
        id: Uuid::new_v4().to_string(),
        email: SubscriberEmail::parse(email.to_string()).unwrap(),
        name: None,
        source: None,
        meta: serde_json::Map::new(),
        subscribed_at: Utc::now(),
        active: None,
    }
}

impl TestApp {
    pub async fn spawn_app() -> TestApp {
        Self::spawn_app_with(TestAppOptions::default()).await
    }

    pub async fn spawn_app_with(options: TestAppOptions) -> TestApp {
        LazyLock::force(&TRACING);

        let mut config = get_configuration().expect("Missing configuration file.");
        let email_server = MockServer::start().await;
        let feed_server = MockServer::start().await;
        let data_dir = TempDir::new().expect("Failed to create a temporary directory.");
        let store_path = data_dir.path().join("mailer.json");

        if !options.subscribers.is_empty() {
            let state = MailerState {
                subscribers: options.subscribers.iter().map(|email| subscriber(email)).collect(),
                ..MailerState::default()
            };
            JsonFileStore::open(&store_path)
                .save(state)
                .expect("Failed to seed the store.");
        }

        // We are using port 0 as way to define a different port per each test. Port 0 is a special case that operating systems
        // take into account: when port is 0, the OS will search for the first available port
        config.set_app_port(0);
        config.application.base_url = "http://127.0.0.1".to_string();
        config.store.path = store_path.clone();
        config.email_client.base_url = email_server.uri();
        config.email_client.domain = MAIL_DOMAIN.to_string();
        config.email_client.api_key = if options.dry_run {
            None
        } else {
            Some(Secret::new("test-api-key".to_string()))
        };
        config.admin.password = if options.no_admin_password {
            None
        } else {
            Some(Secret::new(ADMIN_PASSWORD.to_string()))
        };
        config.feeds.urls = options
            .feed_paths
            .iter()
            .map(|path| format!("{}{}", feed_server.uri(), path))
            .collect();
        // Cycles are driven by the tests themselves
        config.feeds.poll_interval_minutes = 0;

        let application = Application::build(config)
            .await
            .expect("Failed to build application.");

        let port = application.get_port();
        let poller = application.poller();

        tokio::spawn(application.run_until_stop());

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            port,
            email_server,
            feed_server,
            poller,
            store_path,
            _data_dir: data_dir,
        }
    }

    pub async fn post_subscribe(&self, body: serde_json::Value) -> Response {
        reqwest::Client::new()
            .post(&format!("{}/subscribe", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_unsubscribe(&self, email: &str) -> Response {
        reqwest::Client::new()
            .get(&format!("{}/unsubscribe/{}", self.address, email))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_admin(&self, path: &str, password: Option<&str>) -> Response {
        let mut request = reqwest::Client::new().get(&format!("{}/admin{}", self.address, path));
        if let Some(password) = password {
            request = request.header("Authorization", password);
        }

        request.send().await.expect("Failed to execute request.")
    }

    /// What is on disk right now, independent of the running app.
    pub fn load_state(&self) -> MailerState {
        match std::fs::read_to_string(&self.store_path) {
            Ok(contents) => serde_json::from_str(&contents).expect("Store file is not valid JSON."),
            Err(_) => MailerState::default(),
        }
    }

    pub fn subscriber_emails(&self) -> Vec<String> {
        self.load_state()
            .subscribers
            .iter()
            .map(|subscriber| subscriber.email.to_string())
            .collect()
    }

    /// Form fields of every request the mail API received.
    pub async fn sent_emails(&self) -> Vec<SentEmail> {
        self.email_server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| SentEmail::from_form(&request.body))
            .collect()
    }
}

pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl SentEmail {
    fn from_form(body: &[u8]) -> Self {
        let mut email = SentEmail {
            to: String::new(),
            subject: String::new(),
            html: String::new(),
            text: String::new(),
        };

        for (key, value) in url::form_urlencoded::parse(body) {
            match key.as_ref() {
                "to" => email.to = value.into_owned(),
                "subject" => email.subject = value.into_owned(),
                "html" => email.html = value.into_owned(),
                "text" => email.text = value.into_owned(),
                _ => {}
            }
        }

        email
    }

    /// The unsubscribe link of the plain text body, pointed at the test app.
    pub fn unsubscribe_link(&self, port: u16) -> reqwest::Url {
        let links: Vec<_> = linkify::LinkFinder::new()
            .links(&self.text)
            .filter(|link| *link.kind() == linkify::LinkKind::Url)
            .filter(|link| link.as_str().contains("/unsubscribe/"))
            .collect();
        assert_eq!(links.len(), 1);

        let mut link = reqwest::Url::parse(links[0].as_str()).unwrap();
        assert_eq!(link.host_str(), Some("127.0.0.1"));
        link.set_port(Some(port)).unwrap();

        link
    }
}

pub fn rss(items: &[(&str, &str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, link, published)| {
            format!(
                "<item><title>{}</title><link>{}</link><pubDate>{}</pubDate></item>",
                title, link, published
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Blog</title><link>https://blog.example.com</link><description>Posts</description>{}</channel></rss>"#,
        items
    )
}
