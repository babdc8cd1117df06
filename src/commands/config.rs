use crate::context::AppContext;
use crate::strategy::{StrategyConfig, StrategyKind};
use anyhow::{Context, Result};
use log::info;

pub fn run(app: &AppContext, kind: StrategyKind, defaults: bool, init: bool) -> Result<()> {
    let source = app.config_source(kind);

    if init {
        StrategyConfig::default_for(kind)
            .save_default(&source)
            .with_context(|| format!("Failed to seed defaults for {}", kind))?;
        info!("Wrote built-in defaults to {}", source.fallback().display());
    }

    let config = if defaults {
        StrategyConfig::load_default(kind, &source)
            .with_context(|| format!("No default config at {}", source.fallback().display()))?
    } else {
        app.load_config(kind)?
    };

    let document = match &config {
        StrategyConfig::Rsi(config) => serde_json::to_string_pretty(config)?,
        StrategyConfig::Sniper(config) => serde_json::to_string_pretty(config)?,
    };
    println!("{}", document);
    Ok(())
}
