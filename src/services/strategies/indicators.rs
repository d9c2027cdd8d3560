//! Indicator engine: RSI, MACD histogram, Bollinger bands and the fast/slow
//! SMAs, each as a vector aligned index-for-index with the candle series.
//!
//! Values are `None` while a rolling window is still warming up. Every value
//! at index `i` depends only on closes `0..=i`.

use serde::Serialize;
use statrs::statistics::Statistics;

use super::common::{closes, Candle};

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BB_PERIOD: usize = 20;
pub const BB_STD_FACTOR: f64 = 2.0;
pub const SMA_FAST: usize = 50;
pub const SMA_SLOW: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSeries {
    pub rsi:      Vec<Option<f64>>,
    /// MACD histogram (MACD line minus signal line)
    pub macd:     Vec<Option<f64>>,
    pub bb_upper: Vec<Option<f64>>,
    pub bb_lower: Vec<Option<f64>>,
    pub sma_fast: Vec<Option<f64>>,
    pub sma_slow: Vec<Option<f64>>,
}

/// All indicator values at one index, joined with that candle's close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorPoint {
    pub ts:       chrono::DateTime<chrono::Utc>,
    pub close:    f64,
    pub rsi:      Option<f64>,
    pub macd:     Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub sma_fast: Option<f64>,
    pub sma_slow: Option<f64>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.rsi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rsi.is_empty()
    }

    pub fn point(&self, candles: &[Candle], i: usize) -> Option<IndicatorPoint> {
        let c = candles.get(i)?;
        if i >= self.len() {
            return None;
        }
        Some(IndicatorPoint {
            ts: c.ts,
            close: c.close,
            rsi: self.rsi[i],
            macd: self.macd[i],
            bb_upper: self.bb_upper[i],
            bb_lower: self.bb_lower[i],
            sma_fast: self.sma_fast[i],
            sma_slow: self.sma_slow[i],
        })
    }

    /// The last two points, `(previous, last)`.
    pub fn last_pair(&self, candles: &[Candle]) -> Option<(IndicatorPoint, IndicatorPoint)> {
        let n = self.len().min(candles.len());
        if n < 2 {
            return None;
        }
        Some((self.point(candles, n - 2)?, self.point(candles, n - 1)?))
    }
}

/// Compute every indicator over `candles`. Short input is not an error; the
/// affected fields simply stay `None`.
pub fn compute(candles: &[Candle]) -> IndicatorSeries {
    let close = closes(candles);
    let (bb_upper, bb_lower) = bollinger(&close, BB_PERIOD, BB_STD_FACTOR);
    IndicatorSeries {
        rsi: rsi(&close, RSI_PERIOD),
        macd: macd_histogram(&close, MACD_FAST, MACD_SLOW, MACD_SIGNAL),
        bb_upper,
        bb_lower,
        sma_fast: sma(&close, SMA_FAST),
        sma_slow: sma(&close, SMA_SLOW),
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Wilder RSI: gains/losses smoothed with `alpha = 1/period`, seeded at the
/// first bar (change 0). Defined from index `period - 1`. A flat window with
/// neither gains nor losses reads 50.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 {
        return out;
    }
    let alpha = 1.0 / period as f64;
    let (mut avg_gain, mut avg_loss) = (0.0, 0.0);

    for i in 0..closes.len() {
        let change = if i == 0 { 0.0 } else { closes[i] - closes[i - 1] };
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        if i == 0 {
            avg_gain = gain;
            avg_loss = loss;
        } else {
            avg_gain = (1.0 - alpha) * avg_gain + alpha * gain;
            avg_loss = (1.0 - alpha) * avg_loss + alpha * loss;
        }

        if i + 1 < period {
            continue;
        }
        let value = if avg_loss == 0.0 {
            if avg_gain == 0.0 { 50.0 } else { 100.0 }
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        };
        out[i] = finite(value);
    }
    out
}

/// Exponential moving average with `alpha = 2 / (span + 1)`, seeded with the
/// first value.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out: Vec<f64> = Vec::with_capacity(values.len());
    for &v in values {
        let next = match out.last() {
            Some(&prev) => (1.0 - alpha) * prev + alpha * v,
            None => v,
        };
        out.push(next);
    }
    out
}

/// MACD histogram. The MACD line exists once the slow EMA has `slow` bars; the
/// signal EMA then needs `signal` MACD values, so the first defined histogram
/// sits at index `slow + signal - 2` (33 for 12/26/9). Nothing is emitted
/// earlier on purpose: a histogram against a part-seeded signal line crosses
/// zero for reasons that have nothing to do with price.
pub fn macd_histogram(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if slow == 0 || signal == 0 || closes.len() < slow {
        return out;
    }

    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    let line: Vec<f64> = (slow - 1..closes.len())
        .map(|i| fast_ema[i] - slow_ema[i])
        .collect();
    let signal_ema = ema(&line, signal);

    for (k, (m, s)) in line.iter().zip(signal_ema.iter()).enumerate() {
        if k + 1 >= signal {
            out[slow - 1 + k] = finite(m - s);
        }
    }
    out
}

/// Simple moving average; defined from index `window - 1`.
pub fn sma(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if window == 0 || closes.len() < window {
        return out;
    }
    for (k, w) in closes.windows(window).enumerate() {
        out[k + window - 1] = finite(w.iter().sum::<f64>() / window as f64);
    }
    out
}

/// Bollinger bands: SMA ± `k` population standard deviations.
/// Returns `(upper, lower)`.
pub fn bollinger(
    closes: &[f64],
    window: usize,
    k: f64,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let mut upper = vec![None; closes.len()];
    let mut lower = vec![None; closes.len()];
    if window == 0 || closes.len() < window {
        return (upper, lower);
    }
    for (j, w) in closes.windows(window).enumerate() {
        let mid = w.iter().sum::<f64>() / window as f64;
        let sd = w.iter().population_std_dev();
        let i = j + window - 1;
        upper[i] = finite(mid + k * sd);
        lower[i] = finite(mid - k * sd);
    }
    (upper, lower)
}

// =======================================================================
// UNIT TESTS
// =======================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(prices: &[f64]) -> Vec<Candle> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| Candle {
                ts: t0 + Duration::hours(i as i64),
                open: p,
                high: p + 1.0,
                low: p - 1.0,
                close: p,
                volume: 1.0,
            })
            .collect()
    }

    fn prefix_len(v: &[Option<f64>]) -> usize {
        v.iter().take_while(|x| x.is_none()).count()
    }

    #[test]
    fn constant_closes_give_neutral_rsi_after_warmup() {
        let r = rsi(&[42.0; 40], RSI_PERIOD);
        assert_eq!(prefix_len(&r), RSI_PERIOD - 1);
        assert!(r[RSI_PERIOD - 1..].iter().all(|v| *v == Some(50.0)));
    }

    #[test]
    fn rsi_only_gains_reads_100() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let r = rsi(&prices, RSI_PERIOD);
        assert_eq!(r[29], Some(100.0));
    }

    #[test]
    fn rsi_stays_in_range() {
        let prices: Vec<f64> = (0..120)
            .map(|i| 100.0 + ((i * 7) % 11) as f64 - 5.0)
            .collect();
        for v in rsi(&prices, RSI_PERIOD).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn ema_is_seeded_with_first_value() {
        let e = ema(&[10.0, 20.0], 3);
        assert_eq!(e[0], 10.0);
        assert!((e[1] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn sma_and_bands_warm_up_one_short_of_window() {
        let prices: Vec<f64> = (0..250).map(|i| 100.0 + (i % 5) as f64).collect();
        let s = compute(&candles(&prices));
        assert_eq!(s.len(), prices.len());
        assert_eq!(prefix_len(&s.sma_fast), SMA_FAST - 1);
        assert_eq!(prefix_len(&s.sma_slow), SMA_SLOW - 1);
        assert_eq!(prefix_len(&s.bb_upper), BB_PERIOD - 1);
        assert_eq!(prefix_len(&s.bb_lower), BB_PERIOD - 1);
        assert_eq!(prefix_len(&s.macd), MACD_SLOW + MACD_SIGNAL - 2);
    }

    #[test]
    fn flat_bands_collapse_onto_price() {
        let (u, l) = bollinger(&[5.0; 20], BB_PERIOD, BB_STD_FACTOR);
        assert_eq!(u[19], Some(5.0));
        assert_eq!(l[19], Some(5.0));
    }

    #[test]
    fn bands_use_population_deviation() {
        let prices = [1.0, 2.0, 3.0, 4.0];
        let (u, l) = bollinger(&prices, 4, 2.0);
        let sd = (1.25f64).sqrt();
        assert!((u[3].unwrap() - (2.5 + 2.0 * sd)).abs() < 1e-9);
        assert!((l[3].unwrap() - (2.5 - 2.0 * sd)).abs() < 1e-9);
    }

    #[test]
    fn macd_histogram_is_zero_on_flat_prices() {
        let h = macd_histogram(&[7.0; 60], MACD_FAST, MACD_SLOW, MACD_SIGNAL);
        assert!(h[33..].iter().all(|v| v.map(|x| x.abs() < 1e-12) == Some(true)));
    }

    #[test]
    fn macd_histogram_starts_once_signal_is_seeded() {
        let prices: Vec<f64> = (0..60).map(|i| 50.0 + (i as f64 * 0.37).sin() * 4.0).collect();
        let h = macd_histogram(&prices, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
        assert!(h[..33].iter().all(Option::is_none));
        assert!(h[33..].iter().all(Option::is_some));
    }

    #[test]
    fn short_series_is_all_undefined_not_an_error() {
        let s = compute(&candles(&[1.0, 2.0, 3.0]));
        assert_eq!(s.len(), 3);
        assert!(s.macd.iter().all(Option::is_none));
        assert!(s.sma_slow.iter().all(Option::is_none));
    }

    #[test]
    fn no_lookahead() {
        let prices: Vec<f64> = (0..90).map(|i| 50.0 + (i as f64 * 0.37).sin() * 4.0).collect();
        let full = compute(&candles(&prices));
        let cut = compute(&candles(&prices[..60]));
        assert_eq!(&full.rsi[..60], &cut.rsi[..]);
        assert_eq!(&full.macd[..60], &cut.macd[..]);
        assert_eq!(&full.bb_upper[..60], &cut.bb_upper[..]);
    }

    #[test]
    fn last_pair_needs_two_points() {
        let c = candles(&[1.0]);
        assert!(compute(&c).last_pair(&c).is_none());
        let c = candles(&[1.0, 2.0]);
        let (prev, last) = compute(&c).last_pair(&c).unwrap();
        assert_eq!((prev.close, last.close), (1.0, 2.0));
    }
}
