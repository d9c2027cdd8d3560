//! Alert aggregation and scoring for a single evaluation.

use serde::Serialize;

use super::{
    common::{Signal, Thresholds},
    indicators::IndicatorPoint,
    signals::{signals_from, triggers, Trigger},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Assessment {
    pub alerts:  Vec<String>,
    /// Net bullish (+) / bearish (−) pressure, unclamped
    pub score:   i32,
    pub signals: Vec<Signal>,
}

impl Trigger {
    pub fn score_delta(&self) -> i32 {
        match self {
            Trigger::PriceDrop { .. } => 2,
            Trigger::RsiOverbought { .. } => -1,
            Trigger::RsiOversold { .. } => 2,
            Trigger::MacdBullishCross => 2,
            Trigger::MacdBearishCross => -2,
        }
    }

    pub fn alert_text(&self, symbol: &str) -> String {
        match self {
            Trigger::PriceDrop { drop } => {
                format!("🚨 Preissturz: {symbol} fiel um {:.2}%", drop * 100.0)
            }
            Trigger::RsiOverbought { rsi } => format!("📈 RSI überkauft: {rsi:.2}"),
            Trigger::RsiOversold { rsi } => format!("📉 RSI überverkauft: {rsi:.2}"),
            Trigger::MacdBullishCross => "🟢 MACD Crossover: Aufwärtstrend".to_string(),
            Trigger::MacdBearishCross => "🔴 MACD Crossover: Abwärtstrend".to_string(),
        }
    }
}

/// Fold every condition firing between `previous` and `last` into alert lines,
/// a score and trade signals.
pub fn aggregate(
    symbol: &str,
    last: &IndicatorPoint,
    previous: &IndicatorPoint,
    th: &Thresholds,
) -> Assessment {
    let fired = triggers(previous, last, th);
    Assessment {
        alerts: fired.iter().map(|t| t.alert_text(symbol)).collect(),
        score: fired.iter().map(Trigger::score_delta).sum(),
        signals: signals_from(last, &fired),
    }
}
