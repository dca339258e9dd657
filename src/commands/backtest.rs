//! Backtest command implementation

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use adaptive_breakout::backtest::{Backtester, BacktestResult};
use adaptive_breakout::strategies::create_strategy;
use adaptive_breakout::{data, Config};

pub fn run(
    config_path: String,
    capital_override: Option<f64>,
    start_override: Option<String>,
    end_override: Option<String>,
) -> Result<()> {
    info!("Starting backtest");

    // Load configuration
    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    // Apply overrides
    if let Some(capital) = capital_override {
        info!("Overriding initial capital to: {:.2}", capital);
        config.trading.initial_capital = capital;
    }

    if let Some(start) = start_override {
        info!("Overriding start date to: {}", start);
        config.backtest.start_date = Some(start);
    }

    if let Some(end) = end_override {
        info!("Overriding end date to: {}", end);
        config.backtest.end_date = Some(end);
    }

    // Load data
    info!("Loading data from: {}", config.backtest.data_dir);
    let symbol = config.trading.symbol();
    debug!("Symbol: {}", symbol);

    let candles = data::load_symbol(&config.backtest.data_dir, &symbol)?;
    let candles = data::filter_date_range(
        candles,
        config.backtest.start_date.as_deref(),
        config.backtest.end_date.as_deref(),
    )?;
    info!("Backtesting over {} sessions", candles.len());

    // Create strategy from the registry
    let strategy = create_strategy(&config)?;
    info!("Created strategy: {}", strategy.name());

    let mut backtester = Backtester::new(config.clone(), strategy);

    info!("Running backtest...");
    let result = backtester.run(candles);

    print_results(&config, &result);
    save_results(&config, &result)?;

    info!("Backtest completed successfully");

    Ok(())
}

fn print_results(config: &Config, result: &BacktestResult) {
    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Initial Capital:    {:.2}", config.trading.initial_capital);
    println!("Total Return:       {:.2}%", result.metrics.total_return);
    println!("Sharpe Ratio:       {:.2}", result.metrics.sharpe_ratio);
    println!("Max Drawdown:       {:.2}%", result.metrics.max_drawdown);
    println!("Win Rate:           {:.2}%", result.metrics.win_rate);
    println!("Profit Factor:      {:.2}", result.metrics.profit_factor);
    println!("Total Trades:       {}", result.metrics.total_trades);
    println!("Winning Trades:     {}", result.metrics.winning_trades);
    println!("Losing Trades:      {}", result.metrics.losing_trades);
    println!("Average Win:        {:.2}", result.metrics.avg_win);
    println!("Average Loss:       {:.2}", result.metrics.avg_loss);
    println!("Largest Win:        {:.2}", result.metrics.largest_win);
    println!("Largest Loss:       {:.2}", result.metrics.largest_loss);
    println!("Total Commission:   {:.2}", result.metrics.total_commission);
    println!("{}", "=".repeat(60));
}

fn save_results(config: &Config, result: &BacktestResult) -> Result<()> {
    let results_dir = Path::new(&config.backtest.results_dir);
    std::fs::create_dir_all(results_dir).context("Failed to create results directory")?;

    let filename = format!(
        "{}_{}.json",
        config.trading.symbol,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let path = results_dir.join(&filename);

    let json = serde_json::to_string_pretty(result).context("Failed to serialize results")?;
    std::fs::write(&path, json).context("Failed to write results file")?;

    info!("Results saved to: {}", path.display());
    Ok(())
}
