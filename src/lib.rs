pub mod config {
    pub mod settings;
}
pub mod routes {
    pub mod dashboard;
    pub mod health;
}
pub mod services {
    pub mod backtest;
    pub mod bot;
    pub mod dataset;
    pub mod history;
    pub mod market_data;
    pub mod notifier;
    pub mod prediction;
    pub mod scheduler;

    pub mod strategies {
        pub mod common;
        pub use common::Candle;
        pub mod indicators;
        pub mod liquidity;
        pub mod rsi_liquidity;
        pub mod scoring;
        pub mod signals;
    }
}
pub mod utils {
    pub mod errors;
    pub mod types;
}
