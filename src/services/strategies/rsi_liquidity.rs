//! RSI + liquidity-level policy with an explicit single-position state.
//!
//! Enter long when RSI is below `buy_threshold` and price sits below (or
//! within `tolerance` of) the latest Low level; exit when RSI is above
//! `sell_threshold` and price sits above (or within `tolerance` of) the latest
//! High level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    common::{Action, Candle},
    indicators::IndicatorSeries,
    liquidity::{LevelSchedule, LiquidityLevel},
};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LevelParams {
    #[serde(default = "d30")]
    pub buy_threshold: f64,
    #[serde(default = "d70")]
    pub sell_threshold: f64,
    /// Fractional band around a level, 0.005 = 0.5 %
    #[serde(default = "dtol")]
    pub tolerance: f64,
}
fn d30() -> f64 {
    30.0
}
fn d70() -> f64 {
    70.0
}
fn dtol() -> f64 {
    0.005
}

impl Default for LevelParams {
    fn default() -> Self {
        Self {
            buy_threshold: d30(),
            sell_threshold: d70(),
            tolerance: dtol(),
        }
    }
}

/// Two states, two guarded transitions. Pyramiding and shorting are not
/// representable.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Position {
    #[default]
    Flat,
    Long { entry_price: f64 },
}

impl Position {
    /// Flat → Long. Returns `false` (and changes nothing) when already long.
    pub fn enter(&mut self, price: f64) -> bool {
        match self {
            Position::Flat => {
                *self = Position::Long { entry_price: price };
                true
            }
            Position::Long { .. } => false,
        }
    }

    /// Long → Flat, yielding the entry price. `None` when already flat.
    pub fn exit(&mut self) -> Option<f64> {
        match *self {
            Position::Long { entry_price } => {
                *self = Position::Flat;
                Some(entry_price)
            }
            Position::Flat => None,
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Position::Long { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub ts:     DateTime<Utc>,
    pub action: Action,
    pub price:  f64,
    pub index:  usize,
}

fn near(price: f64, level: f64, tolerance: f64) -> bool {
    level != 0.0 && ((price - level) / level).abs() < tolerance
}

/// Replay the policy over the full series and return the trade ledger.
pub fn run(
    candles: &[Candle],
    series: &IndicatorSeries,
    levels: &[LiquidityLevel],
    params: &LevelParams,
) -> Vec<LedgerEntry> {
    let n = candles.len().min(series.len());
    let schedule = LevelSchedule::align(levels, n);
    let mut position = Position::Flat;
    let mut ledger = Vec::new();

    for i in 0..n {
        let Some(rsi) = series.rsi[i] else { continue };
        let c = &candles[i];

        if position.is_long() {
            let Some(high) = schedule.high[i] else { continue };
            let at_resistance = c.close > high || near(c.close, high, params.tolerance);
            if rsi > params.sell_threshold && at_resistance && position.exit().is_some() {
                ledger.push(LedgerEntry { ts: c.ts, action: Action::Sell, price: c.close, index: i });
            }
        } else {
            let Some(low) = schedule.low[i] else { continue };
            let at_support = c.close < low || near(c.close, low, params.tolerance);
            if rsi < params.buy_threshold && at_support && position.enter(c.close) {
                ledger.push(LedgerEntry { ts: c.ts, action: Action::Buy, price: c.close, index: i });
            }
        }
    }
    ledger
}

/// Closed round trips and how many of them sold above their buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LedgerStats {
    pub closed: usize,
    pub wins:   usize,
}

impl LedgerStats {
    pub fn from_ledger(ledger: &[LedgerEntry]) -> Self {
        let mut stats = Self::default();
        for pair in ledger.chunks_exact(2) {
            if pair[0].action == Action::Buy && pair[1].action == Action::Sell {
                stats.closed += 1;
                if pair[1].price > pair[0].price {
                    stats.wins += 1;
                }
            }
        }
        stats
    }

    /// `None` when no trade closed.
    pub fn win_rate(&self) -> Option<f64> {
        (self.closed > 0).then(|| self.wins as f64 / self.closed as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::strategies::{indicators, liquidity};
    use chrono::{Duration, TimeZone};

    fn t(i: usize) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap() + Duration::hours(i as i64)
    }

    fn flat_candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle { ts: t(i), open: c, high: c + 0.5, low: c - 0.5, close: c, volume: 1.0 })
            .collect()
    }

    fn series_with_rsi(rsi: Vec<Option<f64>>) -> IndicatorSeries {
        let n = rsi.len();
        IndicatorSeries {
            rsi,
            macd: vec![None; n],
            bb_upper: vec![None; n],
            bb_lower: vec![None; n],
            sma_fast: vec![None; n],
            sma_slow: vec![None; n],
        }
    }

    fn level(index: usize, price: f64, kind: liquidity::LevelKind) -> LiquidityLevel {
        LiquidityLevel { ts: t(index), price, kind, index }
    }

    #[test]
    fn position_transitions_are_guarded() {
        let mut p = Position::default();
        assert_eq!(p.exit(), None);
        assert!(p.enter(10.0));
        assert!(!p.enter(11.0));
        assert_eq!(p, Position::Long { entry_price: 10.0 });
        assert_eq!(p.exit(), Some(10.0));
        assert_eq!(p, Position::Flat);
    }

    #[test]
    fn no_evaluation_before_first_level() {
        let c = flat_candles(&[100.0, 90.0, 80.0]);
        let s = series_with_rsi(vec![Some(10.0); 3]);
        let lv = vec![level(2, 85.0, liquidity::LevelKind::Low)];
        let ledger = run(&c, &s, &lv, &LevelParams::default());
        // only index 2 has a resolved Low level
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].index, 2);
    }

    #[test]
    fn tolerance_band_counts_as_support() {
        let c = flat_candles(&[100.0, 100.4]);
        let s = series_with_rsi(vec![Some(25.0); 2]);
        let lv = vec![level(0, 100.0, liquidity::LevelKind::Low)];
        let ledger = run(&c, &s, &lv, &LevelParams::default());
        assert_eq!(ledger[0].index, 0);

        let c = flat_candles(&[101.0]);
        let s = series_with_rsi(vec![Some(25.0)]);
        assert!(run(&c, &s, &lv, &LevelParams::default()).is_empty());
    }

    #[test]
    fn tolerance_band_counts_as_resistance() {
        let lv = vec![
            level(0, 97.0, liquidity::LevelKind::Low),
            level(0, 105.0, liquidity::LevelKind::High),
        ];
        let rsi = || series_with_rsi(vec![Some(25.0), Some(75.0)]);

        // 0.38 % under the high: inside the 0.5 % band
        let ledger = run(&flat_candles(&[95.0, 104.6]), &rsi(), &lv, &LevelParams::default());
        let actions: Vec<Action> = ledger.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![Action::Buy, Action::Sell]);
        assert_eq!(ledger[1].index, 1);
        assert_eq!(ledger[1].price, 104.6);

        // 0.57 % under: still long
        let ledger = run(&flat_candles(&[95.0, 104.4]), &rsi(), &lv, &LevelParams::default());
        let actions: Vec<Action> = ledger.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![Action::Buy]);
    }

    #[test]
    fn round_trip_and_single_position() {
        let closes = [100.0, 95.0, 94.0, 99.0, 106.0, 96.0, 108.0];
        let rsi = vec![Some(50.0), Some(25.0), Some(20.0), Some(60.0), Some(75.0), Some(25.0), Some(80.0)];
        let lv = vec![
            level(0, 97.0, liquidity::LevelKind::Low),
            level(0, 105.0, liquidity::LevelKind::High),
        ];
        let ledger = run(&flat_candles(&closes), &series_with_rsi(rsi), &lv, &LevelParams::default());

        let actions: Vec<Action> = ledger.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![Action::Buy, Action::Sell, Action::Buy, Action::Sell]);
        assert!(ledger.windows(2).all(|w| w[0].action != w[1].action));

        let stats = LedgerStats::from_ledger(&ledger);
        assert_eq!(stats, LedgerStats { closed: 2, wins: 2 });
        assert_eq!(stats.win_rate(), Some(1.0));
    }

    #[test]
    fn open_trade_is_not_counted() {
        let ledger = vec![
            LedgerEntry { ts: t(0), action: Action::Buy, price: 10.0, index: 0 },
            LedgerEntry { ts: t(1), action: Action::Sell, price: 9.0, index: 1 },
            LedgerEntry { ts: t(2), action: Action::Buy, price: 8.0, index: 2 },
        ];
        let stats = LedgerStats::from_ledger(&ledger);
        assert_eq!(stats, LedgerStats { closed: 1, wins: 0 });
        assert_eq!(LedgerStats::default().win_rate(), None);
    }

    #[test]
    fn buys_at_index_40_below_prior_low() {
        let closes = [
            100.0, 102.0, 101.0, 105.0, 103.0, 98.0, 99.0, 101.0, 101.8, 101.2, 102.0, 102.8,
            102.2, 103.0, 103.8, 103.2, 104.0, 104.8, 104.2, 105.0, 105.8, 105.2, 106.0, 106.8,
            106.2, 107.0, 107.8, 107.2, 108.0, 108.8, 110.0, 109.0, 108.5, 107.4, 107.0, 105.9,
            105.2, 104.1, 103.0, 103.6, 99.0, 97.5, 98.2, 98.9, 99.6, 100.3, 101.0, 101.7,
            102.4, 103.1, 103.8, 104.5, 105.2, 105.9, 106.6, 107.3, 108.0, 108.7, 109.4, 110.0,
        ];
        let candles = flat_candles(&closes);
        let series = indicators::compute(&candles);
        let levels = liquidity::detect(&candles, 1);

        assert!(series.rsi[40].unwrap() < 30.0);
        assert!(series.rsi[13..40].iter().all(|r| r.unwrap() >= 30.0));
        let low38 = levels
            .iter()
            .find(|l| l.index == 38 && l.kind == liquidity::LevelKind::Low)
            .expect("low at 38");
        assert!(closes[40] < low38.price);

        let ledger = run(&candles, &series, &levels, &LevelParams::default());
        assert_eq!(ledger[0].action, Action::Buy);
        assert_eq!(ledger[0].index, 40);
        assert_eq!(ledger[0].price, 99.0);
    }
}
