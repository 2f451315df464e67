// src/lib.rs
pub mod ports {
    pub mod paper_venue;
    pub mod replay_feed;
    pub mod synthetic_feed;
}
pub mod backtest;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod estimator;
pub mod feed;
pub mod position;
pub mod scheduler;
pub mod signal;
pub mod trade;
pub mod window;
