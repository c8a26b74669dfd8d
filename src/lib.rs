pub mod config;
pub mod domain;
pub mod email_client;
pub mod feeds;
pub mod mailout;
pub mod poller;
pub mod routes;
pub mod startup;
pub mod store;
pub mod telemetry;
