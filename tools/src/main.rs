//! Offline replay of the warning pipeline against exchange history.
//!
//!   - RSI + liquidity-level ledger (closed trades, win rate)
//!   - hit-rate of the direction forecast (model, or alert score without one)
//!   - optional training-set export for the classifier

use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Duration;
use clap::Parser;

use crypto_warnsystem::services::{
    backtest::{self, DirectionPolicy, ScorePolicy},
    dataset,
    market_data::{BinanceRest, Interval, Lookback, MarketDataSource},
    prediction::Predictor,
    strategies::{common::Thresholds, indicators, rsi_liquidity::LevelParams},
};

#[derive(Parser)]
#[command(
    name = "warn-backtest",
    about = "Replay RSI/liquidity trades and forecast hit-rate over historical candles"
)]
struct Cli {
    /// Trading pair, e.g. BTCUSDT
    #[arg(long, default_value = "BTCUSDT")]
    symbol: String,

    /// Candle interval ("5m", "1h", "4h", ...)
    #[arg(long, default_value = "1h")]
    interval: Interval,

    /// History to replay, in days
    #[arg(long, default_value_t = 60)]
    lookback_days: i64,

    /// Half-width of the swing-point window for liquidity levels
    #[arg(long, default_value_t = 10)]
    level_window: usize,

    /// Classifier JSON; without it the alert score is evaluated instead
    #[arg(long)]
    model: Option<PathBuf>,

    /// First bar evaluated by the hit-rate replay
    #[arg(long, default_value_t = 24)]
    window_size: usize,

    /// Bars ahead the forecast is checked against
    #[arg(long, default_value_t = 4)]
    step_size: usize,

    /// Write hit-rate samples here as CSV
    #[arg(long)]
    results: Option<PathBuf>,

    /// Write labelled feature rows here as CSV
    #[arg(long)]
    export_dataset: Option<PathBuf>,

    #[arg(long, default_value = "https://api.binance.com")]
    base_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if cli.lookback_days <= 0 {
        bail!("--lookback-days must be positive");
    }
    let span = Duration::try_days(cli.lookback_days).context("--lookback-days out of range")?;

    let source = BinanceRest::new(cli.base_url.clone());
    let candles = source
        .fetch_candles(&cli.symbol, cli.interval, Lookback::Span(span))
        .await;
    if candles.is_empty() {
        bail!("no candles for {} {}", cli.symbol, cli.interval);
    }
    println!("🔁 Backtest für {} ({} Kerzen, {})", cli.symbol, candles.len(), cli.interval);

    let series = indicators::compute(&candles);

    // ---- RSI + liquidity ledger ---------------------------------------------
    let ledger = backtest::ledger_run(&candles, &series, cli.level_window, &LevelParams::default());
    println!("🔍 {} abgeschlossene Trades gefunden ({} Levels).", ledger.stats.closed, ledger.levels);
    match ledger.stats.win_rate() {
        Some(w) => println!("📈 Gewinnquote: {:.2}%", w * 100.0),
        None => println!("📈 Gewinnquote: keine abgeschlossenen Trades"),
    }
    for e in &ledger.ledger {
        println!("   {} {:<4} {:.2}", e.ts.format("%Y-%m-%d %H:%M"), e.action.as_str(), e.price);
    }

    // ---- forecast hit-rate --------------------------------------------------
    let predictor = cli.model.as_deref().map(Predictor::load);
    let score_policy = ScorePolicy { thresholds: Thresholds::default() };
    let (policy, label): (&dyn DirectionPolicy, &str) = match &predictor {
        Some(p) if p.is_available() => (p as &dyn DirectionPolicy, "Modell"),
        _ => (&score_policy as &dyn DirectionPolicy, "Score"),
    };

    let report = backtest::hit_rate(&candles, &series, policy, cli.window_size, cli.step_size);
    if report.insufficient_data {
        println!("⚠️ Zu wenige Daten für window {} + step {}", cli.window_size, cli.step_size);
    } else {
        match report.accuracy() {
            Some(a) => println!(
                "➡️ Trefferquote ({label}): {:.2}% ({} von {})",
                a * 100.0,
                report.hits,
                report.total
            ),
            None => println!("➡️ Trefferquote ({label}): keine bewertbaren Punkte"),
        }
    }

    if let Some(path) = &cli.results {
        let mut wtr = csv::Writer::from_path(path).with_context(|| format!("open {}", path.display()))?;
        for s in &report.samples {
            wtr.serialize(s)?;
        }
        wtr.flush()?;
        println!("💾 Ergebnisse gespeichert: {}", path.display());
    }

    if let Some(path) = &cli.export_dataset {
        let rows = dataset::labelled_rows(&candles, &series, dataset::FUTURE_PERIODS);
        dataset::write_csv(path, &rows).with_context(|| format!("write {}", path.display()))?;
        println!("💾 {} Trainingszeilen gespeichert: {}", rows.len(), path.display());
    }

    Ok(())
}
