//! Historical replay: hit-rate of a direction policy and the RSI + liquidity
//! trade ledger.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::services::{
    prediction::{Direction, Predictor},
    strategies::{
        common::{Candle, Thresholds},
        indicators::IndicatorSeries,
        liquidity,
        rsi_liquidity::{self, LedgerEntry, LedgerStats, LevelParams},
        scoring::aggregate,
    },
};

/// A policy's answer at one bar. Rule-based policies carry no confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Call {
    pub direction:  Direction,
    pub confidence: Option<f64>,
}

impl Call {
    pub fn bare(direction: Direction) -> Self {
        Self { direction, confidence: None }
    }
}

/// Anything that can call a direction at bar `i` using data up to `i`.
pub trait DirectionPolicy {
    fn predict(&self, candles: &[Candle], series: &IndicatorSeries, i: usize) -> Option<Call>;
}

/// Up when the threshold/crossover score is positive.
pub struct ScorePolicy {
    pub thresholds: Thresholds,
}

impl DirectionPolicy for ScorePolicy {
    fn predict(&self, candles: &[Candle], series: &IndicatorSeries, i: usize) -> Option<Call> {
        let last = series.point(candles, i)?;
        let prev = series.point(candles, i.checked_sub(1)?)?;
        let a = aggregate("", &last, &prev, &self.thresholds);
        Some(Call::bare(if a.score > 0 { Direction::Up } else { Direction::DownOrFlat }))
    }
}

impl DirectionPolicy for Predictor {
    fn predict(&self, candles: &[Candle], series: &IndicatorSeries, i: usize) -> Option<Call> {
        self.predict_at(candles, series, i)
            .map(|p| Call { direction: p.direction, confidence: Some(p.confidence) })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub ts:        DateTime<Utc>,
    pub realized:  Direction,
    pub predicted: Direction,
    /// Model probability of `predicted`; empty for rule-based policies
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitRateReport {
    pub hits:    usize,
    pub total:   usize,
    pub samples: Vec<Sample>,
    /// Not more than `window_size + step_size` bars: nothing could be evaluated
    pub insufficient_data: bool,
}

impl HitRateReport {
    /// `None` for an empty run, never a misleading 0 %.
    pub fn accuracy(&self) -> Option<f64> {
        (self.total > 0).then(|| self.hits as f64 / self.total as f64)
    }
}

/// For each `i` in `window_size..len - step_size`, compare the policy's call
/// at `i` with the realised move `close[i + step] > close[i]`. Bars where the
/// policy abstains are skipped.
pub fn hit_rate(
    candles: &[Candle],
    series: &IndicatorSeries,
    policy: &dyn DirectionPolicy,
    window_size: usize,
    step_size: usize,
) -> HitRateReport {
    let n = candles.len().min(series.len());
    let mut report = HitRateReport {
        hits: 0,
        total: 0,
        samples: Vec::new(),
        insufficient_data: n <= window_size + step_size,
    };
    if report.insufficient_data {
        log::warn!(
            "backtest: {n} bars do not exceed window {window_size} + step {step_size}, nothing to evaluate"
        );
        return report;
    }

    for i in window_size..n - step_size {
        let Some(call) = policy.predict(candles, series, i) else {
            continue;
        };
        let realized = if candles[i + step_size].close > candles[i].close {
            Direction::Up
        } else {
            Direction::DownOrFlat
        };
        report.total += 1;
        if call.direction == realized {
            report.hits += 1;
        }
        report.samples.push(Sample {
            ts: candles[i].ts,
            realized,
            predicted: call.direction,
            confidence: call.confidence,
        });
    }
    report
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerReport {
    pub levels: usize,
    pub ledger: Vec<LedgerEntry>,
    pub stats:  LedgerStats,
}

/// Detect levels, replay the RSI + liquidity policy, summarise round trips.
pub fn ledger_run(
    candles: &[Candle],
    series: &IndicatorSeries,
    level_window: usize,
    params: &LevelParams,
) -> LedgerReport {
    let levels = liquidity::detect(candles, level_window);
    let ledger = rsi_liquidity::run(candles, series, &levels, params);
    let stats = LedgerStats::from_ledger(&ledger);
    log::info!(
        "backtest: {} levels, {} closed trades, {} wins",
        levels.len(),
        stats.closed,
        stats.wins
    );
    LedgerReport { levels: levels.len(), ledger, stats }
}
