//! Periodic live cycle: fetch → indicators → alerts → forecast → log → notify.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde::Serialize;

use crate::{
    config::settings::Settings,
    services::{
        history::{HistoryEntry, PredictionHistory},
        market_data::{Interval, Lookback, MarketDataSource},
        notifier::{notify_best_effort, Notifier},
        prediction::{PredictionResult, Predictor},
        strategies::{
            common::{Candle, Thresholds},
            indicators::{self, IndicatorPoint},
            scoring::{aggregate, Assessment},
        },
    },
    utils::errors::CycleError,
};

/// Why a cycle produced less than a full result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Degradation {
    DataUnavailable,
    ModelUnavailable,
    InsufficientHistory,
}

/// Everything one evaluation of a symbol knows.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub symbol:       String,
    pub bars:         usize,
    pub last:         Option<IndicatorPoint>,
    pub assessment:   Assessment,
    pub prediction:   Option<PredictionResult>,
    pub degradations: Vec<Degradation>,
}

impl Evaluation {
    pub fn last_close(&self) -> Option<f64> {
        self.last.as_ref().map(|p| p.close)
    }
}

/// Pure part of a cycle; no side effects besides logging.
pub fn evaluate(
    symbol: &str,
    candles: &[Candle],
    predictor: &Predictor,
    thresholds: &Thresholds,
) -> Evaluation {
    let mut eval = Evaluation {
        symbol: symbol.to_string(),
        bars: candles.len(),
        last: None,
        assessment: Assessment::default(),
        prediction: None,
        degradations: Vec::new(),
    };

    if candles.is_empty() {
        log::warn!("{symbol}: no candles, skipping evaluation");
        eval.degradations.push(Degradation::DataUnavailable);
        return eval;
    }

    let series = indicators::compute(candles);
    eval.last = series.point(candles, candles.len() - 1);

    match series.last_pair(candles) {
        Some((prev, last)) => eval.assessment = aggregate(symbol, &last, &prev, thresholds),
        None => eval.degradations.push(Degradation::InsufficientHistory),
    }

    if !predictor.is_available() {
        eval.degradations.push(Degradation::ModelUnavailable);
    } else {
        eval.prediction = predictor.predict_latest(candles, &series);
        if eval.prediction.is_none() && !eval.degradations.contains(&Degradation::InsufficientHistory) {
            eval.degradations.push(Degradation::InsufficientHistory);
        }
    }
    eval
}

// ---------------------------------------------------------------------------
// Message templates
// ---------------------------------------------------------------------------

pub fn prediction_message(symbol: &str, p: &PredictionResult) -> String {
    format!(
        "📊 Automatische Prognose für {symbol}:\n{}\nVertrauen: {:.1}%",
        p.direction.label(),
        p.confidence * 100.0
    )
}

pub const NO_PREDICTION: &str = "⚠️ Keine Prognose generierbar (zu wenige Daten?)";

pub fn alerts_message(symbol: &str, a: &Assessment) -> String {
    let mut msg = format!("🔔 Warnungen für {symbol}:\n");
    for line in &a.alerts {
        msg.push_str(line);
        msg.push('\n');
    }
    msg.push_str(&format!("📈 Handelsscore: {}", a.score));
    msg
}

pub fn failure_message(e: &CycleError) -> String {
    format!("❌ Fehler im Scheduler: {e}")
}

// ---------------------------------------------------------------------------
// Live cycle
// ---------------------------------------------------------------------------

pub struct CycleContext {
    pub symbol:      String,
    pub interval:    Interval,
    pub lookback:    Lookback,
    pub thresholds:  Thresholds,
    pub destination: String,
    pub source:      Arc<dyn MarketDataSource>,
    pub predictor:   Arc<Predictor>,
    pub notifier:    Arc<dyn Notifier>,
    pub history:     PredictionHistory,
}

impl CycleContext {
    pub fn from_settings(
        settings: &Settings,
        source: Arc<dyn MarketDataSource>,
        predictor: Arc<Predictor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            symbol: settings.symbol.clone(),
            interval: settings.interval,
            lookback: settings.lookback(),
            thresholds: settings.thresholds,
            destination: settings.destination(),
            source,
            predictor,
            notifier,
            history: PredictionHistory::new(settings.history_path.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub evaluation:    Evaluation,
    pub messages_sent: usize,
    pub error:         Option<String>,
}

pub async fn run_cycle(ctx: &CycleContext) -> CycleReport {
    metrics::increment_counter!("warn_cycles_total");

    let candles = ctx.source.fetch_candles(&ctx.symbol, ctx.interval, ctx.lookback).await;
    let evaluation = evaluate(&ctx.symbol, &candles, &ctx.predictor, &ctx.thresholds);

    let mut outbox: Vec<String> = Vec::new();
    let error = match record_and_compose(ctx, &evaluation, &mut outbox) {
        Ok(()) => None,
        Err(e) => {
            log::error!("scheduler: {e}");
            outbox.push(failure_message(&e));
            Some(e.to_string())
        }
    };

    let mut messages_sent = 0;
    for text in &outbox {
        if notify_best_effort(ctx.notifier.as_ref(), &ctx.destination, text).await {
            messages_sent += 1;
        }
    }

    log::info!(
        "cycle {}: {} bars, score {}, {} alerts, degraded {:?}",
        ctx.symbol,
        evaluation.bars,
        evaluation.assessment.score,
        evaluation.assessment.alerts.len(),
        evaluation.degradations
    );
    CycleReport { evaluation, messages_sent, error }
}

fn record_and_compose(
    ctx: &CycleContext,
    eval: &Evaluation,
    outbox: &mut Vec<String>,
) -> Result<(), CycleError> {
    if !eval.assessment.alerts.is_empty() {
        metrics::counter!("warn_alerts_total", eval.assessment.alerts.len() as u64);
        outbox.push(alerts_message(&ctx.symbol, &eval.assessment));
    }

    match &eval.prediction {
        Some(p) => {
            metrics::increment_counter!("warn_predictions_total");
            outbox.push(prediction_message(&ctx.symbol, p));
            ctx.history.append(HistoryEntry {
                timestamp: Utc::now(),
                direction: p.direction,
                confidence: p.confidence,
            })?;
        }
        None => outbox.push(NO_PREDICTION.to_string()),
    }
    Ok(())
}

/// Never returns.
pub async fn run_forever(ctx: Arc<CycleContext>, every: Duration) {
    log::info!("scheduler started for {}, every {:?}", ctx.symbol, every);
    loop {
        run_cycle(&ctx).await;
        tokio::time::sleep(every).await;
    }
}
