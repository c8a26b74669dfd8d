use std::io;

use feed_mailer::config::get_configuration;
use feed_mailer::startup::Application;
use feed_mailer::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> io::Result<()> {
    let subscriber = get_subscriber(
        String::from("feed_mailer"),
        String::from("info"),
        io::stdout,
    );

    init_subscriber(subscriber);

    let config = get_configuration().map_err(|err| {
        tracing::error!("Failed to load configuration: {}", err);
        io::Error::new(io::ErrorKind::InvalidData, err)
    })?;

    let application = Application::build(config).await?;

    tracing::info!("Server listening on port {}", application.get_port());

    application.run_until_stop().await
}
