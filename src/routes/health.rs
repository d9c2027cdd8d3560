use actix_web::{get, web, HttpResponse, Scope};

use crate::routes::dashboard::AppState;

#[get("/health")]
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Prometheus text exposition of the service counters.
#[get("/metrics")]
async fn metrics_endpoint(state: web::Data<AppState>) -> HttpResponse {
    match &state.prometheus {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

/// Root-level scope; register it after every prefixed scope.
pub fn health_scope() -> Scope {
    web::scope("")
        .service(health_check)
        .service(metrics_endpoint)
}
