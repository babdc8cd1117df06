use crate::context::AppContext;
use crate::signals::SignalAction;
use crate::strategy::{create_strategy, StrategyKind};
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn run(app: &AppContext, kind: StrategyKind, data: &Path, symbol: Option<&str>) -> Result<()> {
    info!("Received signals command for template_id={}", kind.template_id());
    let candles = app.load_candles(data, symbol)?;
    let config = app.load_config(kind)?;

    let mut generator = create_strategy(config);
    let last_bar = generator.execute(&candles);

    println!("{} on {} ({} candles)", kind, candles.symbol, candles.len());
    for (action, point) in generator.signals().chronological() {
        let label = match action {
            SignalAction::Buy => "BUY ",
            SignalAction::Sell => "SELL",
        };
        println!(
            "{} {} @ {:.4}",
            label,
            point.timestamp.format("%Y-%m-%d %H:%M:%S"),
            point.price
        );
    }
    println!(
        "Signals: {} buy / {} sell",
        generator.buy_points().len(),
        generator.sell_points().len()
    );
    println!("Last bar: buy={} sell={}", last_bar.buy, last_bar.sell);
    Ok(())
}
