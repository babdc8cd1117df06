pub mod config;
pub mod evaluate;
pub mod optimize;
pub mod signals;
