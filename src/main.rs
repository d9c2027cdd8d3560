use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use metrics_exporter_prometheus::PrometheusBuilder;

use crypto_warnsystem::{
    config::settings::Settings,
    routes::{
        dashboard::{dashboard_scope, AppState},
        health::health_scope,
    },
    services::{
        bot::{self, BotContext},
        history::PredictionHistory,
        market_data::{source_from_settings, MarketDataSource},
        notifier::{notifier_from_settings, TelegramNotifier},
        prediction::Predictor,
        scheduler::{self, CycleContext},
    },
};

fn init_logging() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
        .init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_logging();
    log::info!("Starting crypto warn system…");

    let settings = Settings::new().unwrap_or_else(|e| {
        eprintln!("Failed to load settings: {e}");
        std::process::exit(1);
    });

    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(h) => Some(h),
        Err(e) => {
            log::warn!("metrics recorder not installed: {e}");
            None
        }
    };

    let source = source_from_settings(&settings);
    let predictor = Arc::new(Predictor::load(&settings.model_path));
    let notifier = notifier_from_settings(&settings);
    log::info!(
        "symbol {} @ {}, source {}, cycle every {}h",
        settings.symbol,
        settings.interval,
        source.name(),
        settings.interval_hours
    );

    // --- scheduler -----------------------------------------------------------
    {
        let ctx = Arc::new(CycleContext::from_settings(
            &settings,
            source.clone(),
            predictor.clone(),
            notifier,
        ));
        let every = settings.cycle_every();
        tokio::spawn(scheduler::run_forever(ctx, every));
    }

    // --- command bot ---------------------------------------------------------
    if let (true, Some(token)) = (settings.bot_enabled, settings.telegram_token.as_deref()) {
        let tg = TelegramNotifier::new(settings.telegram_base_url.clone(), token);
        let ctx = BotContext::from_settings(&settings, source.clone(), predictor.clone());
        tokio::spawn(bot::poll_updates(tg, ctx));
    }

    let port = settings.server_port;
    let state = web::Data::new(AppState {
        history: PredictionHistory::new(settings.history_path.clone()),
        settings,
        source,
        predictor,
        prometheus,
    });

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .service(dashboard_scope())
            .service(health_scope())
    })
        .bind(("0.0.0.0", port))?
        .run()
        .await
}
