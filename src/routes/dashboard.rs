// src/routes/dashboard.rs
use std::sync::Arc;

use actix_web::{get, web, HttpResponse, Responder, Scope};
use chrono::{Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;

use crate::{
    config::settings::Settings,
    services::{
        history::PredictionHistory, market_data::MarketDataSource, prediction::Predictor,
        scheduler::evaluate,
    },
    utils::types::ApiResponse,
};

/// Shared by every handler through `web::Data`.
pub struct AppState {
    pub settings:   Settings,
    pub source:     Arc<dyn MarketDataSource>,
    pub predictor:  Arc<Predictor>,
    pub history:    PredictionHistory,
    pub prometheus: Option<PrometheusHandle>,
}

/// GET /api/snapshot/{symbol}
///
/// Latest close, indicators, alerts, score, signals and forecast. An empty
/// fetch is still a 200; the `degradations` field says what is missing.
#[get("/snapshot/{symbol}")]
pub async fn snapshot(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let symbol = path.into_inner().to_uppercase();
    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return HttpResponse::BadRequest().json(ApiResponse::<()>::err("invalid symbol"));
    }

    let s = &state.settings;
    let candles = state.source.fetch_candles(&symbol, s.interval, s.lookback()).await;
    let eval = evaluate(&symbol, &candles, &state.predictor, &s.thresholds);
    HttpResponse::Ok().json(ApiResponse::ok(eval))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "d24")]
    pub hours: i64,
}
fn d24() -> i64 {
    24
}

/// GET /api/history?hours=24
#[get("/history")]
pub async fn history(state: web::Data<AppState>, q: web::Query<HistoryQuery>) -> impl Responder {
    if q.hours <= 0 {
        return HttpResponse::BadRequest().json(ApiResponse::<()>::err("hours must be positive"));
    }
    let Some(since) = Duration::try_hours(q.hours).and_then(|d| Utc::now().checked_sub_signed(d)) else {
        return HttpResponse::BadRequest().json(ApiResponse::<()>::err("hours out of range"));
    };
    match state.history.recent(since) {
        Ok(rows) => HttpResponse::Ok().json(ApiResponse::ok(rows)),
        Err(e) => {
            log::error!("history: {e}");
            HttpResponse::InternalServerError().json(ApiResponse::<()>::err("history unavailable"))
        }
    }
}

pub fn dashboard_scope() -> Scope {
    web::scope("/api")
        .service(snapshot)
        .service(history)
}
