//! Candle sources.
//! -----------------------------------------------------------------
//! ‣ `MarketDataSource` is the only way the pipeline sees an exchange.
//! ‣ `BinanceRest` pages through `/api/v3/klines`.
//! ‣ `NullSource` always answers with no data.
//!
//! A source never errors towards its caller: failures are logged and turn
//! into an empty series, which downstream treats as "no signal".
//! -----------------------------------------------------------------

use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde_json::Value;

use crate::config::settings::{DataSourceKind, Settings};
use crate::services::strategies::Candle;
use crate::utils::errors::ApiError;

const PAGE_LIMIT: usize = 1000; // Binance max per request
const MAX_PAGES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
    D3,
    W1,
    Mo1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M3 => "3m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H2 => "2h",
            Interval::H4 => "4h",
            Interval::H6 => "6h",
            Interval::H8 => "8h",
            Interval::H12 => "12h",
            Interval::D1 => "1d",
            Interval::D3 => "3d",
            Interval::W1 => "1w",
            Interval::Mo1 => "1M",
        }
    }

    /// Bar length; a month counts as 30 days.
    pub fn duration(&self) -> Duration {
        match self {
            Interval::M1 => Duration::minutes(1),
            Interval::M3 => Duration::minutes(3),
            Interval::M5 => Duration::minutes(5),
            Interval::M15 => Duration::minutes(15),
            Interval::M30 => Duration::minutes(30),
            Interval::H1 => Duration::hours(1),
            Interval::H2 => Duration::hours(2),
            Interval::H4 => Duration::hours(4),
            Interval::H6 => Duration::hours(6),
            Interval::H8 => Duration::hours(8),
            Interval::H12 => Duration::hours(12),
            Interval::D1 => Duration::days(1),
            Interval::D3 => Duration::days(3),
            Interval::W1 => Duration::weeks(1),
            Interval::Mo1 => Duration::days(30),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "1M" (month) vs "1m" (minute) is case-sensitive on Binance
        let all = [
            Interval::M1, Interval::M3, Interval::M5, Interval::M15, Interval::M30,
            Interval::H1, Interval::H2, Interval::H4, Interval::H6, Interval::H8,
            Interval::H12, Interval::D1, Interval::D3, Interval::W1, Interval::Mo1,
        ];
        all.into_iter()
            .find(|i| i.as_str() == s.trim())
            .ok_or_else(|| format!("unknown interval '{s}'"))
    }
}

/// How much history to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    Bars(usize),
    Span(Duration),
}

impl Lookback {
    /// Oldest open time wanted. Spans too large for the calendar clamp to the
    /// earliest representable instant.
    pub fn start(&self, interval: Interval, now: DateTime<Utc>) -> DateTime<Utc> {
        let span = match *self {
            Lookback::Bars(n) => i32::try_from(n)
                .ok()
                .and_then(|n| interval.duration().checked_mul(n)),
            Lookback::Span(d) => Some(d),
        };
        span.and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Ordered, de-duplicated candles; empty when the provider is unreachable.
    async fn fetch_candles(&self, symbol: &str, interval: Interval, lookback: Lookback) -> Vec<Candle>;

    fn name(&self) -> &'static str;
}

pub struct NullSource;

#[async_trait]
impl MarketDataSource for NullSource {
    async fn fetch_candles(&self, _: &str, _: Interval, _: Lookback) -> Vec<Candle> {
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/* ─────────────────────────────────────────  Binance REST ────── */

pub struct BinanceRest {
    http: Client,
    base_url: String,
}

impl BinanceRest {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The `PAGE_LIMIT` bars opening at or before `end_ms`, oldest first.
    async fn fetch_page(
        &self,
        symbol: &str,
        interval: Interval,
        end_ms: i64,
    ) -> Result<Vec<Candle>, ApiError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("symbol", symbol.to_uppercase()),
                ("interval", interval.as_str().to_string()),
                ("endTime", end_ms.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let description = resp.text().await.unwrap_or_default();
            return Err(ApiError::Rejected { status: status.as_u16(), description });
        }

        let rows: Vec<Vec<Value>> = resp.json().await?;
        Ok(rows.iter().filter_map(|r| parse_kline_row(r)).collect())
    }

    /// Pages backwards from now, so hitting `MAX_PAGES` drops the oldest bars
    /// and never the newest.
    async fn fetch_all(
        &self,
        symbol: &str,
        interval: Interval,
        lookback: Lookback,
    ) -> Result<Vec<Candle>, ApiError> {
        let now = Utc::now();
        let start = lookback.start(interval, now);
        let wanted = match lookback {
            Lookback::Bars(n) => Some(n),
            Lookback::Span(_) => None,
        };

        let mut end_ms = now.timestamp_millis();
        let mut pages: Vec<Vec<Candle>> = Vec::new();
        let mut total = 0;
        let mut covered = false;

        for _ in 0..MAX_PAGES {
            let page = self.fetch_page(symbol, interval, end_ms).await?;
            let Some(first) = page.first().map(|c| c.ts) else {
                covered = true;
                break;
            };
            let short = page.len() < PAGE_LIMIT;
            total += page.len();
            pages.push(page);
            if short || first <= start || wanted.is_some_and(|n| total >= n) {
                covered = true;
                break;
            }
            end_ms = first.timestamp_millis() - 1;
        }
        if !covered {
            log::warn!(
                "binance: {symbol} {interval} window exceeds {} bars, oldest part dropped",
                MAX_PAGES * PAGE_LIMIT
            );
        }

        let out: Vec<Candle> = pages
            .into_iter()
            .rev()
            .flatten()
            .filter(|c| c.ts >= start)
            .collect();
        let mut out = normalise(out);
        if let Some(n) = wanted {
            let skip = out.len().saturating_sub(n);
            out.drain(..skip);
        }
        Ok(out)
    }
}

#[async_trait]
impl MarketDataSource for BinanceRest {
    async fn fetch_candles(&self, symbol: &str, interval: Interval, lookback: Lookback) -> Vec<Candle> {
        match self.fetch_all(symbol, interval, lookback).await {
            Ok(c) => {
                log::debug!("binance: {} {symbol} {interval} candles", c.len());
                c
            }
            Err(e) => {
                log::error!("binance klines {symbol} {interval}: {e}");
                Vec::new()
            }
        }
    }

    fn name(&self) -> &'static str {
        "binance"
    }
}

/// One kline row: `[open_time, "open", "high", "low", "close", "volume", ...]`.
/// Malformed rows are dropped rather than zero-filled.
pub fn parse_kline_row(row: &[Value]) -> Option<Candle> {
    fn num(v: &Value) -> Option<f64> {
        match v {
            Value::String(s) => s.parse::<f64>().ok(),
            other => other.as_f64(),
        }
        .filter(|x| x.is_finite())
    }

    if row.len() < 6 {
        return None;
    }
    Some(Candle {
        ts: DateTime::<Utc>::from_timestamp_millis(row[0].as_i64()?)?,
        open: num(&row[1])?,
        high: num(&row[2])?,
        low: num(&row[3])?,
        close: num(&row[4])?,
        volume: num(&row[5])?,
    })
}

/// Sort by open time and keep the first bar per timestamp.
pub fn normalise(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.ts);
    candles.dedup_by_key(|c| c.ts);
    candles
}

pub fn source_from_settings(settings: &Settings) -> Arc<dyn MarketDataSource> {
    match settings.data_source {
        DataSourceKind::Live => Arc::new(BinanceRest::new(settings.binance_base_url.clone())),
        DataSourceKind::Null => Arc::new(NullSource),
    }
}

// ──────────────────────────────────────────────────────────────
// UNIT-TESTS
// ──────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn kline_row_parses_string_prices() {
        let row = json!([1704067200000i64, "42000.1", "42100.0", "41900.5", "42050.0", "12.5", 1704067499999i64, "0", 10, "0", "0", "0"]);
        let c = parse_kline_row(row.as_array().unwrap()).unwrap();
        assert_eq!(c.ts, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert!((c.open - 42000.1).abs() < 1e-9);
        assert!((c.close - 42050.0).abs() < 1e-9);
        assert!((c.volume - 12.5).abs() < 1e-9);
    }

    #[test]
    fn malformed_row_is_dropped() {
        let row = json!([1704067200000i64, "bad", "1", "1", "1", "1"]);
        assert!(parse_kline_row(row.as_array().unwrap()).is_none());
        let short = json!([1704067200000i64, "1"]);
        assert!(parse_kline_row(short.as_array().unwrap()).is_none());
    }

    #[test]
    fn interval_round_trips_and_is_case_sensitive() {
        assert_eq!("5m".parse::<Interval>().unwrap(), Interval::M5);
        assert_eq!("1M".parse::<Interval>().unwrap(), Interval::Mo1);
        assert_eq!("1m".parse::<Interval>().unwrap(), Interval::M1);
        assert!("7h".parse::<Interval>().is_err());
        assert_eq!(Interval::H4.to_string(), "4h");
    }

    #[test]
    fn lookback_start() {
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        assert_eq!(
            Lookback::Bars(48).start(Interval::H1, now),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(Lookback::Span(Duration::days(2)).start(Interval::M5, now), now - Duration::days(2));
    }

    #[test]
    fn normalise_sorts_and_dedups() {
        let t = |h| Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap();
        let c = |h, p| Candle { ts: t(h), open: p, high: p, low: p, close: p, volume: 0.0 };
        let out = normalise(vec![c(2, 3.0), c(1, 1.0), c(2, 9.0), c(0, 0.5)]);
        let hours: Vec<_> = out.iter().map(|x| x.ts).collect();
        assert_eq!(hours, vec![t(0), t(1), t(2)]);
    }

    #[test]
    fn oversized_lookback_clamps_instead_of_wrapping() {
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        assert_eq!(Lookback::Bars(usize::MAX).start(Interval::M1, now), DateTime::<Utc>::MIN_UTC);
        assert_eq!(Lookback::Bars(i32::MAX as usize).start(Interval::W1, now), DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn null_source_is_empty() {
        assert!(NullSource.fetch_candles("BTCUSDT", Interval::H1, Lookback::Bars(10)).await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_exchange_degrades_to_empty() {
        let src = BinanceRest::new("http://127.0.0.1:9");
        assert!(src.fetch_candles("BTCUSDT", Interval::H1, Lookback::Bars(10)).await.is_empty());
    }

    // ---- local exchange stub -----------------------------------------------

    #[derive(serde::Deserialize)]
    struct PageQuery {
        #[serde(rename = "endTime")]
        end_time: i64,
        limit: i64,
    }

    const MINUTE_MS: i64 = 60_000;

    /// 1m bars from `first_open` up to the current minute, served the way the
    /// exchange does: the last `limit` bars opening at or before `endTime`.
    async fn klines(first_open: actix_web::web::Data<i64>, q: actix_web::web::Query<PageQuery>) -> actix_web::HttpResponse {
        let now = Utc::now().timestamp_millis().div_euclid(MINUTE_MS) * MINUTE_MS;
        let last = q.end_time.min(now).div_euclid(MINUTE_MS) * MINUTE_MS;
        let first = (last - (q.limit - 1) * MINUTE_MS).max(**first_open);
        let rows: Vec<serde_json::Value> = (0..)
            .map(|k| first + k * MINUTE_MS)
            .take_while(|t| *t <= last)
            .map(|t| json!([t, "100.0", "100.5", "99.5", "100.0", "1.0"]))
            .collect();
        actix_web::HttpResponse::Ok().json(rows)
    }

    fn spawn_exchange(history: Duration) -> String {
        use actix_web::{web, App, HttpServer};
        let first_open = (Utc::now() - history).timestamp_millis().div_euclid(MINUTE_MS) * MINUTE_MS;
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(first_open))
                .route("/api/v3/klines", web::get().to(klines))
        })
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_rt::spawn(server.run());
        format!("http://{addr}")
    }

    #[actix_rt::test]
    async fn long_window_keeps_newest_bars() {
        let src = BinanceRest::new(spawn_exchange(Duration::days(61)));
        let c = src.fetch_candles("BTCUSDT", Interval::M1, Lookback::Span(Duration::days(60))).await;

        assert_eq!(c.len(), MAX_PAGES * PAGE_LIMIT);
        let newest_age = Utc::now() - c.last().unwrap().ts;
        assert!(newest_age < Duration::minutes(2), "newest bar is {newest_age} old");
        assert!(c.windows(2).all(|w| w[1].ts - w[0].ts == Duration::minutes(1)));
    }

    #[actix_rt::test]
    async fn bar_lookback_spans_pages() {
        let src = BinanceRest::new(spawn_exchange(Duration::days(2)));
        let c = src.fetch_candles("BTCUSDT", Interval::M1, Lookback::Bars(1500)).await;

        assert_eq!(c.len(), 1500);
        assert!(Utc::now() - c.last().unwrap().ts < Duration::minutes(2));
        assert!(c.windows(2).all(|w| w[0].ts < w[1].ts));
    }
}
