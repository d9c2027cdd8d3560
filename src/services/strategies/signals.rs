//! Threshold / crossover signal policy.
//!
//! Evaluates a `(previous, last)` pair of indicator points. Live mode looks at
//! the final pair only; [`scan`] walks every consecutive pair of a series.

use serde::Serialize;

use super::{
    common::{Action, Candle, Signal, Thresholds},
    indicators::{IndicatorPoint, IndicatorSeries},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// `drop` is the fractional fall from the previous close
    PriceDrop { drop: f64 },
    RsiOverbought { rsi: f64 },
    RsiOversold { rsi: f64 },
    MacdBullishCross,
    MacdBearishCross,
}

impl Trigger {
    /// Trade bias of the trigger. A price drop is an alert only.
    pub fn action(&self) -> Option<Action> {
        match self {
            Trigger::PriceDrop { .. } => None,
            Trigger::RsiOverbought { .. } | Trigger::MacdBearishCross => Some(Action::Sell),
            Trigger::RsiOversold { .. } | Trigger::MacdBullishCross => Some(Action::Buy),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Trigger::PriceDrop { .. } => "Preissturz",
            Trigger::RsiOverbought { .. } => "RSI überkauft",
            Trigger::RsiOversold { .. } => "RSI überverkauft",
            Trigger::MacdBullishCross => "MACD Crossover oben",
            Trigger::MacdBearishCross => "MACD Crossover unten",
        }
    }
}

/// Every condition that fires between `prev` and `last`. Conditions are
/// independent; undefined inputs simply do not fire.
pub fn triggers(prev: &IndicatorPoint, last: &IndicatorPoint, th: &Thresholds) -> Vec<Trigger> {
    let mut out = Vec::new();

    if prev.close > 0.0 {
        let drop = (prev.close - last.close) / prev.close;
        if drop >= th.drop_pct {
            out.push(Trigger::PriceDrop { drop });
        }
    }

    if let Some(rsi) = last.rsi {
        if rsi >= th.rsi_overbought {
            out.push(Trigger::RsiOverbought { rsi });
        }
        if rsi <= th.rsi_oversold {
            out.push(Trigger::RsiOversold { rsi });
        }
    }

    if let (Some(before), Some(now)) = (prev.macd, last.macd) {
        if now > 0.0 && before <= 0.0 {
            out.push(Trigger::MacdBullishCross);
        } else if now < 0.0 && before >= 0.0 {
            out.push(Trigger::MacdBearishCross);
        }
    }
    out
}

/// Turn triggers into trade signals stamped at `last`.
pub fn signals_from(last: &IndicatorPoint, fired: &[Trigger]) -> Vec<Signal> {
    fired
        .iter()
        .filter_map(|t| {
            t.action().map(|action| Signal {
                ts: last.ts,
                action,
                price: last.close,
                reason: t.reason().to_string(),
            })
        })
        .collect()
}

/// Backtest mode: evaluate every consecutive pair and collect the signals in
/// time order.
pub fn scan(candles: &[Candle], series: &IndicatorSeries, th: &Thresholds) -> Vec<Signal> {
    let n = candles.len().min(series.len());
    let mut out = Vec::new();
    for i in 1..n {
        let (Some(prev), Some(last)) = (series.point(candles, i - 1), series.point(candles, i)) else {
            continue;
        };
        out.extend(signals_from(&last, &triggers(&prev, &last, th)));
    }
    out
}
