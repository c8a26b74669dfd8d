use actix_web::{web, HttpResponse, Responder};
use chrono::{SecondsFormat, Utc};
use std::time::Instant;

/// When the process started serving, for the uptime reported by the heartbeat.
pub struct StartedAt(pub Instant);

#[derive(serde::Serialize)]
struct Heartbeat {
    status: &'static str,
    timestamp: String,
    uptime: f64,
    message: &'static str,
}

/// Endpoint used by clients to know if the server is working
#[tracing::instrument(name = "Heartbeat handler", skip(started_at))]
pub async fn heartbeat(started_at: web::Data<StartedAt>) -> impl Responder {
    HttpResponse::Ok().json(Heartbeat {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime: started_at.0.elapsed().as_secs_f64(),
        message: "Server is running",
    })
}
