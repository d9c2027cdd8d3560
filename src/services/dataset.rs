//! Training rows for the offline classifier.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::services::prediction::Features;
use crate::services::strategies::{common::Candle, indicators::IndicatorSeries};
use crate::utils::errors::HistoryError;

/// Bars ahead used for the label.
pub const FUTURE_PERIODS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelledRow {
    pub timestamp: DateTime<Utc>,
    pub rsi:       f64,
    pub macd:      f64,
    pub bb_upper:  f64,
    pub bb_lower:  f64,
    pub sma50:     f64,
    pub sma200:    f64,
    pub close:     f64,
    /// `close[i + future] > close[i]`
    pub target:    u8,
}

/// One row per bar with every feature defined and a future bar to label it.
pub fn labelled_rows(candles: &[Candle], series: &IndicatorSeries, future: usize) -> Vec<LabelledRow> {
    let n = candles.len().min(series.len());
    (0..n.saturating_sub(future))
        .filter_map(|i| {
            let f = Features::from_point(&series.point(candles, i)?)?;
            Some(LabelledRow {
                timestamp: candles[i].ts,
                rsi: f.rsi,
                macd: f.macd,
                bb_upper: f.bb_upper,
                bb_lower: f.bb_lower,
                sma50: f.sma_fast,
                sma200: f.sma_slow,
                close: f.close,
                target: u8::from(candles[i + future].close > candles[i].close),
            })
        })
        .collect()
}

pub fn write_csv(path: &Path, rows: &[LabelledRow]) -> Result<(), HistoryError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}
