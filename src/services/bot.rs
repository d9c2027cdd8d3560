//! Chat command bot: answers `/start`, `/hilfe`, `/prognose` and `/verlauf`.

use std::{sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{
    config::settings::Settings,
    services::{
        market_data::{Interval, Lookback, MarketDataSource},
        notifier::{notify_best_effort, TelegramNotifier},
        prediction::Predictor,
        strategies::indicators,
    },
    utils::errors::ApiError,
};

const LONG_POLL_SECS: u64 = 30;
const RETRY_PAUSE: Duration = Duration::from_secs(5);
/// `/verlauf` compares the last close with the one 24 bars back.
const CHANGE_BARS: usize = 24;

pub struct BotContext {
    pub symbol:    String,
    pub interval:  Interval,
    pub lookback:  Lookback,
    pub source:    Arc<dyn MarketDataSource>,
    pub predictor: Arc<Predictor>,
}

impl BotContext {
    pub fn from_settings(
        settings: &Settings,
        source: Arc<dyn MarketDataSource>,
        predictor: Arc<Predictor>,
    ) -> Self {
        Self {
            symbol: settings.symbol.clone(),
            interval: settings.interval,
            lookback: settings.lookback(),
            source,
            predictor,
        }
    }
}

pub async fn handle_command(text: &str, ctx: &BotContext) -> String {
    let command = text.trim().to_lowercase();
    log::info!("command received: {command}");

    match command.as_str() {
        "/start" => format!(
            "👋 Willkommen beim Crypto-Warn-Bot!\n\nVerfügbare Befehle:\n\
             /prognose – Zeigt ML-Prognose für {sym}\n\
             /verlauf – Kursveränderung der letzten 24h\n\
             /hilfe – Hilfe anzeigen",
            sym = ctx.symbol
        ),
        "/hilfe" => format!(
            "📘 Befehle:\n\
             /prognose – ML-Vorhersage für {sym}\n\
             /verlauf – Kursveränderung 24h\n\
             /hilfe – Hilfe anzeigen",
            sym = ctx.symbol
        ),
        "/prognose" => prognose(ctx).await,
        "/verlauf" => verlauf(ctx).await,
        _ => "❓ Unbekannter Befehl. Nutze /hilfe.".to_string(),
    }
}

async fn prognose(ctx: &BotContext) -> String {
    let candles = ctx.source.fetch_candles(&ctx.symbol, ctx.interval, ctx.lookback).await;
    let series = indicators::compute(&candles);
    match ctx.predictor.predict_latest(&candles, &series) {
        Some(p) => format!(
            "📊 Prognose (4h): {}\nVertrauen: {:.1}%",
            p.direction.label(),
            p.confidence * 100.0
        ),
        None => "⚠️ Keine Prognose verfügbar.".to_string(),
    }
}

async fn verlauf(ctx: &BotContext) -> String {
    let candles = ctx
        .source
        .fetch_candles(&ctx.symbol, Interval::H1, Lookback::Bars(2 * CHANGE_BARS))
        .await;
    match change_24h(&candles.iter().map(|c| c.close).collect::<Vec<_>>()) {
        Ok(change) => {
            let emoji = if change > 0.0 { "📈" } else { "📉" };
            format!("{emoji} Kursveränderung (24h): {change:.2} %")
        }
        Err(e) => format!("❌ Fehler beim Abrufen der Daten: {e}"),
    }
}

/// Percent change from the 24th-from-last close to the last close.
pub fn change_24h(closes: &[f64]) -> Result<f64, String> {
    if closes.len() < CHANGE_BARS {
        return Err(format!("nur {} von {CHANGE_BARS} Kerzen erhalten", closes.len()));
    }
    let now = closes[closes.len() - 1];
    let past = closes[closes.len() - CHANGE_BARS];
    if past == 0.0 {
        return Err("Referenzkurs ist 0".into());
    }
    Ok((now - past) / past * 100.0)
}

// ---------------------------------------------------------------------------
// Telegram long polling
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct UpdatesEnvelope {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

pub async fn fetch_updates(tg: &TelegramNotifier, offset: i64) -> Result<Vec<Update>, ApiError> {
    let resp = tg
        .http()
        .get(tg.method_url("getUpdates"))
        .query(&[("offset", offset.to_string()), ("timeout", LONG_POLL_SECS.to_string())])
        .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
        .send()
        .await?;
    let status = resp.status();
    let env: UpdatesEnvelope = resp.json().await?;
    if !env.ok {
        return Err(ApiError::Rejected {
            status: status.as_u16(),
            description: env.description.unwrap_or_default(),
        });
    }
    Ok(env.result)
}

/// Offset that acknowledges every update seen so far.
pub fn next_offset(updates: &[Update], current: i64) -> i64 {
    updates.iter().map(|u| u.update_id + 1).fold(current, i64::max)
}

/// Never returns.
pub async fn poll_updates(tg: TelegramNotifier, ctx: BotContext) {
    log::info!("🤖 bot polling for commands");
    let mut offset = 0;
    loop {
        let updates = match fetch_updates(&tg, offset).await {
            Ok(u) => u,
            Err(e) => {
                log::warn!("getUpdates failed: {e}");
                tokio::time::sleep(RETRY_PAUSE).await;
                continue;
            }
        };
        offset = next_offset(&updates, offset);

        for update in updates {
            let Some(Message { chat, text: Some(text) }) = update.message else {
                continue;
            };
            let reply = handle_command(&text, &ctx).await;
            notify_best_effort(&tg, &chat.id.to_string(), &reply).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        market_data::NullSource,
        prediction::{Classifier, Features},
        strategies::common::Candle,
    };
    use crate::utils::errors::ModelError;
    use async_trait::async_trait;
    use chrono::{Duration as Span, TimeZone, Utc};

    struct Ramp;
    #[async_trait]
    impl MarketDataSource for Ramp {
        async fn fetch_candles(&self, _: &str, _: Interval, lookback: Lookback) -> Vec<Candle> {
            let n = match lookback {
                Lookback::Bars(n) => n,
                Lookback::Span(_) => 300,
            };
            let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            (0..n)
                .map(|i| {
                    let p = 100.0 + i as f64;
                    Candle { ts: t0 + Span::hours(i as i64), open: p, high: p, low: p, close: p, volume: 1.0 }
                })
                .collect()
        }
        fn name(&self) -> &'static str {
            "ramp"
        }
    }

    struct Bearish;
    impl Classifier for Bearish {
        fn predict_proba(&self, _: &Features) -> Result<[f64; 2], ModelError> {
            Ok([0.64, 0.36])
        }
        fn version(&self) -> &str {
            "fake"
        }
    }

    fn ctx(source: Arc<dyn MarketDataSource>, predictor: Predictor) -> BotContext {
        BotContext {
            symbol: "BTCUSDT".into(),
            interval: Interval::M5,
            lookback: Lookback::Span(Span::hours(48)),
            source,
            predictor: Arc::new(predictor),
        }
    }

    #[tokio::test]
    async fn commands_are_normalised() {
        let c = ctx(Arc::new(NullSource), Predictor::unavailable());
        assert!(handle_command("  /START ", &c).await.starts_with("👋 Willkommen"));
        assert!(handle_command("/hilfe", &c).await.starts_with("📘 Befehle:"));
        assert_eq!(handle_command("/kaufen", &c).await, "❓ Unbekannter Befehl. Nutze /hilfe.");
    }

    #[tokio::test]
    async fn prognose_without_model() {
        let c = ctx(Arc::new(Ramp), Predictor::unavailable());
        assert_eq!(handle_command("/prognose", &c).await, "⚠️ Keine Prognose verfügbar.");
    }

    #[tokio::test]
    async fn prognose_with_model() {
        let c = ctx(Arc::new(Ramp), Predictor::new(Some(Box::new(Bearish))));
        assert_eq!(
            handle_command("/prognose", &c).await,
            "📊 Prognose (4h): 📉 Fällt/Seitwärts\nVertrauen: 64.0%"
        );
    }

    #[tokio::test]
    async fn verlauf_reports_change() {
        let c = ctx(Arc::new(Ramp), Predictor::unavailable());
        // 48 bars: last 147, 24th from last 124
        let expected = (147.0 - 124.0) / 124.0 * 100.0;
        assert_eq!(
            handle_command("/verlauf", &c).await,
            format!("📈 Kursveränderung (24h): {expected:.2} %")
        );
    }

    #[tokio::test]
    async fn verlauf_without_data_is_an_error_message() {
        let c = ctx(Arc::new(NullSource), Predictor::unavailable());
        assert!(handle_command("/verlauf", &c).await.starts_with("❌ Fehler beim Abrufen der Daten:"));
    }

    #[test]
    fn change_is_negative_when_falling() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        assert!(change_24h(&closes).unwrap() < 0.0);
        assert!(change_24h(&closes[..23]).is_err());
    }

    #[test]
    fn offset_acknowledges_highest_update() {
        let raw = r#"[{"update_id": 7, "message": {"chat": {"id": 1}, "text": "/hilfe"}},
                      {"update_id": 9},
                      {"update_id": 8, "message": {"chat": {"id": 1}}}]"#;
        let updates: Vec<Update> = serde_json::from_str(raw).unwrap();
        assert_eq!(next_offset(&updates, 0), 10);
        assert_eq!(next_offset(&[], 10), 10);
    }
}
