use dotenv::dotenv;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::services::market_data::{Interval, Lookback};
use crate::services::strategies::common::Thresholds;
use crate::utils::errors::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceKind {
    Live,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierKind {
    Telegram,
    Log,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_port: u16,
    pub symbol: String,
    pub interval: Interval,
    pub lookback_hours: i64,
    pub data_source: DataSourceKind,
    pub binance_base_url: String,
    pub thresholds: Thresholds,
    pub interval_hours: u64,
    pub notifier: NotifierKind,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_base_url: String,
    pub bot_enabled: bool,
    pub model_path: PathBuf,
    pub history_path: PathBuf,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        dotenv().ok(); // loads `.env` file automatically
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let server_port = parse_or(&get, "SERVER_PORT", 8080u16, "a port number")?;
        let symbol = get("SYMBOL").unwrap_or_else(|| "BTCUSDT".into()).to_uppercase();
        let interval = parse_or(&get, "INTERVAL", Interval::M5, "a Binance interval like 5m or 1h")?;
        let lookback_hours = parse_or(&get, "LOOKBACK_HOURS", 48i64, "a whole number of hours")?;
        if lookback_hours <= 0 || chrono::Duration::try_hours(lookback_hours).is_none() {
            return Err(invalid("LOOKBACK_HOURS", "a positive span of hours", lookback_hours));
        }

        let data_source = match get("DATA_SOURCE").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("live") => DataSourceKind::Live,
            Some("null") => DataSourceKind::Null,
            Some(other) => return Err(invalid("DATA_SOURCE", "live or null", other)),
        };
        let binance_base_url =
            get("BINANCE_BASE_URL").unwrap_or_else(|| "https://api.binance.com".into());

        // percent in the environment, fraction internally
        let drop_percent = parse_or(&get, "PRICE_DROP_THRESHOLD", 3.0f64, "a percentage")?;
        let rsi_overbought = parse_or(&get, "RSI_OVERBOUGHT", 70.0f64, "a number")?;
        let rsi_oversold = parse_or(&get, "RSI_OVERSOLD", 30.0f64, "a number")?;
        if !(drop_percent > 0.0) {
            return Err(invalid("PRICE_DROP_THRESHOLD", "greater than zero", drop_percent));
        }
        if rsi_oversold >= rsi_overbought {
            return Err(invalid("RSI_OVERSOLD", "below RSI_OVERBOUGHT", rsi_oversold));
        }

        let interval_hours = parse_or(&get, "INTERVAL_HOURS", 4u64, "a whole number of hours")?;
        if interval_hours == 0 {
            return Err(invalid("INTERVAL_HOURS", "at least 1", interval_hours));
        }

        let notifier = match get("NOTIFIER").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("log") => NotifierKind::Log,
            Some("telegram") => NotifierKind::Telegram,
            Some(other) => return Err(invalid("NOTIFIER", "telegram or log", other)),
        };
        let telegram_token = get("TELEGRAM_TOKEN");
        let telegram_chat_id = get("TELEGRAM_CHAT_ID");
        let bot_enabled = parse_or(&get, "BOT_ENABLED", false, "true or false")?;

        if notifier == NotifierKind::Telegram {
            if telegram_token.is_none() {
                return Err(ConfigError::Missing("TELEGRAM_TOKEN", "NOTIFIER=telegram"));
            }
            if telegram_chat_id.is_none() {
                return Err(ConfigError::Missing("TELEGRAM_CHAT_ID", "NOTIFIER=telegram"));
            }
        }
        if bot_enabled && telegram_token.is_none() {
            return Err(ConfigError::Missing("TELEGRAM_TOKEN", "BOT_ENABLED=true"));
        }

        Ok(Self {
            server_port,
            symbol,
            interval,
            lookback_hours,
            data_source,
            binance_base_url,
            thresholds: Thresholds {
                drop_pct: drop_percent / 100.0,
                rsi_overbought,
                rsi_oversold,
            },
            interval_hours,
            notifier,
            telegram_token,
            telegram_chat_id,
            telegram_base_url: get("TELEGRAM_BASE_URL")
                .unwrap_or_else(|| "https://api.telegram.org".into()),
            bot_enabled,
            model_path: get("MODEL_PATH")
                .unwrap_or_else(|| "model/trained_model.json".into())
                .into(),
            history_path: get("HISTORY_PATH")
                .unwrap_or_else(|| "prognose_history.csv".into())
                .into(),
        })
    }

    pub fn lookback(&self) -> Lookback {
        Lookback::Span(chrono::Duration::hours(self.lookback_hours))
    }

    pub fn cycle_every(&self) -> Duration {
        Duration::from_secs(self.interval_hours * 3600)
    }

    /// Chat for scheduled messages; `log` when none is configured.
    pub fn destination(&self) -> String {
        self.telegram_chat_id.clone().unwrap_or_else(|| "log".into())
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T, expected: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid { key, expected, value: raw }),
    }
}

fn invalid(key: &'static str, expected: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid { key, expected, value: value.to_string() }
}
