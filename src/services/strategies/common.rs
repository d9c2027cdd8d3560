// src/services/strategies/common.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV bar, keyed by its open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub ts:     DateTime<Utc>,
    pub open:   f64,
    pub high:   f64,
    pub low:    f64,
    pub close:  f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
        }
    }
}

/// A discrete trade idea. Never mutated once emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub ts:     DateTime<Utc>,
    pub action: Action,
    pub price:  f64,
    pub reason: String,
}

/// Alert-evaluation thresholds. `drop_pct` is a fraction (0.03 = 3 %).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub drop_pct:       f64,
    pub rsi_overbought: f64,
    pub rsi_oversold:   f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            drop_pct: 0.03,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
        }
    }
}

/// Closing prices, the input every indicator is computed from.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}
