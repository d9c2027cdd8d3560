//! Swing-point ("liquidity level") detection.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::common::Candle;

pub const DEFAULT_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiquidityLevel {
    pub ts:    DateTime<Utc>,
    pub price: f64,
    pub kind:  LevelKind,
    /// Position of the swing bar in the scanned series
    pub index: usize,
}

/// Emit a level wherever a bar's high (low) equals the max (min) of the
/// centred window `[i - window, i + window]`. Bars closer than `window` to
/// either edge are never evaluated; ties all qualify.
pub fn detect(candles: &[Candle], window: usize) -> Vec<LiquidityLevel> {
    let n = candles.len();
    let mut levels = Vec::new();
    if n < 2 * window + 1 {
        return levels;
    }

    for i in window..n - window {
        let span = &candles[i - window..=i + window];
        let max_high = span.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let min_low = span.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let c = &candles[i];

        if c.high == max_high {
            levels.push(LiquidityLevel { ts: c.ts, price: c.high, kind: LevelKind::High, index: i });
        }
        if c.low == min_low {
            levels.push(LiquidityLevel { ts: c.ts, price: c.low, kind: LevelKind::Low, index: i });
        }
    }
    levels
}

/// Per-bar view of the most recent High and Low level at or before each index
/// (forward-filled). `None` until the first level of that kind appears.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelSchedule {
    pub high: Vec<Option<f64>>,
    pub low:  Vec<Option<f64>>,
}

impl LevelSchedule {
    pub fn align(levels: &[LiquidityLevel], len: usize) -> Self {
        let mut high_at = vec![None; len];
        let mut low_at = vec![None; len];
        for lvl in levels.iter().filter(|l| l.index < len) {
            match lvl.kind {
                LevelKind::High => high_at[lvl.index] = Some(lvl.price),
                LevelKind::Low => low_at[lvl.index] = Some(lvl.price),
            }
        }
        Self {
            high: forward_fill(high_at),
            low: forward_fill(low_at),
        }
    }
}

fn forward_fill(mut v: Vec<Option<f64>>) -> Vec<Option<f64>> {
    let mut last = None;
    for slot in v.iter_mut() {
        match slot {
            Some(p) if p.is_finite() => last = Some(*p),
            _ => *slot = last,
        }
    }
    v
}
