pub mod backtester;
pub mod candle_utils;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod feeder;
pub mod indicators;
pub mod models;
pub mod optimizer;
pub mod optimizer_status;
pub mod param_utils;
pub mod performance;
pub mod signals;
pub mod strategy;
pub mod strategy_utils;

pub use error::{EngineError, EngineResult};
