use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::error::InternalError;
use actix_web::{web, App, HttpResponse, HttpServer};
use std::io;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_actix_web::TracingLogger;

use crate::config::Settings;
use crate::email_client::EmailClient;
use crate::feeds::FeedClient;
use crate::mailout::Mailer;
use crate::poller::Poller;
use crate::routes::{
    get_db, handle_subscribe, handle_unsubscribe, heartbeat, send_test_email, AdminPassword,
    ApiMessage, StartedAt,
};
use crate::store::{JsonFileStore, Store};

pub struct Application {
    port: u16,
    server: Server,
    poller: Arc<Poller>,
    poll_interval: Duration,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, io::Error> {
        let store: Arc<dyn Store> = Arc::new(JsonFileStore::open(&config.store.path));

        let sender_email = config
            .email_client
            .get_sender_email()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let api_key = config.email_client.get_api_key();
        if api_key.is_none() {
            tracing::warn!("No mail API key configured, mailouts will only be logged");
        }
        let email_client = EmailClient::new(
            config.email_client.base_url.clone(),
            config.email_client.domain.clone(),
            sender_email,
            api_key,
            Some(config.email_client.timeout()),
        )
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mailer = Arc::new(Mailer::new(
            email_client,
            config.mailout.clone(),
            config.application.base_url.clone(),
        ));

        if config.feeds.allow_invalid_certs {
            tracing::warn!("feeds.allow_invalid_certs is set, TLS certificates of feeds are not verified");
        }
        let feed_client = FeedClient::new(config.feeds.allow_invalid_certs, config.feeds.timeout())
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let poller = Arc::new(Poller::new(
            Arc::clone(&store),
            feed_client,
            Arc::clone(&mailer),
            config.feeds.urls.clone(),
        ));

        let listener = TcpListener::bind(config.get_address())?;
        let port = listener.local_addr()?.port();
        let server = run(
            listener,
            store,
            mailer,
            AdminPassword(config.admin.get_password()),
        )?;

        Ok(Self {
            port,
            server,
            poller,
            poll_interval: config.feeds.poll_interval(),
        })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn poller(&self) -> Arc<Poller> {
        Arc::clone(&self.poller)
    }

    /// Serves HTTP and, unless the interval is zero, polls the feeds on schedule.
    pub async fn run_until_stop(self) -> Result<(), io::Error> {
        if self.poll_interval.is_zero() {
            tracing::info!("Scheduled feed polling is disabled");
        } else {
            tokio::spawn(self.poller.run_forever(self.poll_interval));
        }

        self.server.await
    }
}

pub fn run(
    listener: TcpListener,
    store: Arc<dyn Store>,
    mailer: Arc<Mailer>,
    admin_password: AdminPassword,
) -> Result<Server, io::Error> {
    let store = web::Data::from(store);
    let mailer = web::Data::from(mailer);
    let admin_password = web::Data::new(admin_password);
    let started_at = web::Data::new(StartedAt(Instant::now()));

    let server = HttpServer::new(move || {
        // Malformed JSON gets the same error body as a failed validation
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            let message = format!("Invalid request body: {}", err);
            InternalError::from_response(err, HttpResponse::BadRequest().json(ApiMessage::error(message)))
                .into()
        });

        // Any origin may call the API, answered with a wildcard
        let cors = Cors::default()
            .allow_any_origin()
            .send_wildcard()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            // 'wrap' method adds a middleware to the App. This specific middleware provide incoming
            // request logger
            .wrap(TracingLogger::default())
            .app_data(json_config)
            .route("/heartbeat", web::get().to(heartbeat))
            .route("/subscribe", web::post().to(handle_subscribe))
            .route("/unsubscribe/{email}", web::get().to(handle_unsubscribe))
            .service(
                web::scope("/admin")
                    .route("/db", web::get().to(get_db))
                    .route("/test/{email}", web::get().to(send_test_email)),
            )
            .app_data(store.clone())
            .app_data(mailer.clone())
            .app_data(admin_password.clone())
            .app_data(started_at.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
