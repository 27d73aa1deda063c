//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use crate::adapters::csv_adapter::{CsvHistoryReader, HistoryFormat};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::line_price_adapter::LinePriceSource;
use crate::adapters::paper_executor::PaperExecutor;
use crate::domain::bar::Bar;
use crate::domain::backtest::{run_backtests, series_from_transactions};
use crate::domain::config_validation::{bot_settings, build_strategies, build_strategy};
use crate::domain::error::StochtraderError;
use crate::domain::live::{AssetContext, Scheduler, Services};
use crate::domain::metrics::Metrics;
use crate::domain::position::Position;
use crate::domain::strategy::StrategyConfig;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{BarStore, Storage, TransactionStore};

#[derive(Parser, Debug)]
#[command(name = "stochtrader", about = "Stochastic oscillator trading bot and backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest configured assets against history files
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        asset: Option<String>,
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
    /// Validate a bot configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run the live loop with paper execution
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Stop after this many scheduler ticks
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Show the stored position of an asset
    Position {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        asset: String,
    },
    /// Evaluate the live bot from stored bars and transactions
    Evaluate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        asset: String,
        #[arg(long, default_value_t = 10_000)]
        bars: usize,
    },
    /// Seed the bar store from a history file
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        asset: String,
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            asset,
            data,
        } => run_backtest(&config, asset.as_deref(), data.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Run { config, ticks } => run_live(&config, ticks),
        Command::Position { config, asset } => run_position(&config, &asset),
        Command::Evaluate {
            config,
            asset,
            bars,
        } => run_evaluate(&config, &asset, bars),
        Command::Import {
            config,
            asset,
            data,
        } => run_import(&config, &asset, data.as_deref()),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

fn fail(err: &StochtraderError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

/// Strategies for one asset, or for every asset listed under `[bot]`.
pub fn resolve_strategies(
    config: &dyn ConfigPort,
    asset: Option<&str>,
) -> Result<Vec<StrategyConfig>, StochtraderError> {
    match asset {
        Some(asset) => Ok(vec![build_strategy(config, asset)?]),
        None => build_strategies(config),
    }
}

/// History reader from `[<asset>] data` and `data_format`, or `path_override`.
pub fn history_reader(
    config: &dyn ConfigPort,
    asset: &str,
    path_override: Option<&Path>,
) -> Result<CsvHistoryReader, StochtraderError> {
    let path = match path_override {
        Some(p) => p.to_path_buf(),
        None => config
            .get_string(asset, "data")
            .map(PathBuf::from)
            .ok_or_else(|| StochtraderError::ConfigMissing {
                section: asset.to_string(),
                key: "data".into(),
            })?,
    };
    let format = match config.get_string(asset, "data_format") {
        Some(raw) => raw
            .parse::<HistoryFormat>()
            .map_err(|reason| StochtraderError::invalid(asset, "data_format", reason))?,
        None => HistoryFormat::default(),
    };
    Ok(CsvHistoryReader::new(path, format))
}

fn run_backtest(config_path: &Path, asset: Option<&str>, data: Option<&Path>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let strategies = match resolve_strategies(&adapter, asset) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    if data.is_some() && strategies.len() > 1 {
        eprintln!("error: --data needs --asset when several assets are configured");
        return ExitCode::from(2);
    }

    let mut jobs = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        let bars = match history_reader(&adapter, &strategy.asset, data).and_then(|r| r.read_bars()) {
            Ok(b) => b,
            Err(e) => return fail(&e),
        };
        eprintln!("Loaded {} bars for {}", bars.len(), strategy.asset);
        jobs.push((strategy, bars));
    }

    run_backtest_pipeline(jobs)
}

/// Backtests every job, prints one report per asset and returns the exit code
/// of the first failure.
pub fn run_backtest_pipeline(jobs: Vec<(StrategyConfig, Vec<Bar>)>) -> ExitCode {
    let fees: Vec<f64> = jobs.iter().map(|(s, _)| s.fee).collect();
    let mut exit = ExitCode::SUCCESS;
    let mut failed = false;

    for ((asset, result), fee) in run_backtests(jobs).into_iter().zip(fees) {
        let outcome = result.and_then(|run| {
            let metrics = Metrics::compute(&run.series, fee)?;
            Ok((run.series.len(), metrics))
        });
        match outcome {
            Ok((bars, metrics)) => println!("{}", format_report(&asset, bars, &metrics)),
            Err(e) => {
                eprintln!("error: {asset}: {e}");
                if !failed {
                    exit = (&e).into();
                    failed = true;
                }
            }
        }
    }

    exit
}

pub fn format_report(asset: &str, bars: usize, metrics: &Metrics) -> String {
    let mut out = format!("=== {asset} ===\n");
    out.push_str(&format!("Bars:             {bars}\n"));
    out.push_str(&format!("Market Return:    {:.4}\n", metrics.market_return));
    out.push_str(&format!("Strategy Return:  {:.4}\n", metrics.strategy_return));
    out.push_str(&format!("Max Drawdown:     {:.4}\n", metrics.max_drawdown));
    match (metrics.drawdown_start, metrics.drawdown_end) {
        (Some(start), Some(end)) => out.push_str(&format!(
            "Drawdown Period:  {} min ({start} to {end})\n",
            metrics.drawdown_period.num_minutes()
        )),
        _ => out.push_str("Drawdown Period:  none\n"),
    }
    out.push_str(&format!("Transactions:     {}", metrics.transactions));
    out
}

fn run_validate(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let settings = match bot_settings(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let strategies = match build_strategies(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    eprintln!(
        "Bot: {} assets, sample period {} ms, reset every {} min",
        settings.assets.len(),
        settings.sample_period_ms,
        settings.reset_period.num_minutes()
    );
    for s in &strategies {
        eprintln!(
            "  {}: {} ({}), enter {} {}, exit {} {}, hours {}-{}, thresholds {}/{}, needs {} bars",
            s.asset,
            s.kind,
            s.exit_filter,
            s.enter_interval,
            s.enter,
            s.exit_interval,
            s.exit,
            s.start_hour,
            s.end_hour,
            s.long_threshold,
            s.short_threshold,
            s.required_base_bars()
        );
    }
    eprintln!("Validation passed");
    ExitCode::SUCCESS
}

/// Opens the configured store: `[sqlite]` when present, else `[postgres]`.
pub fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn Storage>, StochtraderError> {
    #[cfg(feature = "sqlite")]
    {
        if config.get_string("sqlite", "path").is_some() {
            let store = crate::adapters::sqlite_adapter::SqliteStore::from_config(config)?;
            store.initialize_schema()?;
            return Ok(Box::new(store));
        }
    }

    #[cfg(feature = "postgres")]
    {
        let store = crate::adapters::postgres_adapter::PostgresStore::from_config(config)?;
        store.initialize_schema()?;
        Ok(Box::new(store))
    }

    #[cfg(not(feature = "postgres"))]
    {
        let _ = config;
        Err(StochtraderError::ConfigMissing {
            section: "sqlite".into(),
            key: "path".into(),
        })
    }
}

fn run_live(config_path: &Path, ticks: Option<u64>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let settings = match bot_settings(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let strategies = match build_strategies(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let store = match open_store(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let executor = PaperExecutor::new();

    let services = Services {
        bars: store.bars(),
        transactions: store.transactions(),
        indicators: Some(store.indicators()),
        executor: &executor,
    };
    let mut scheduler = Scheduler::new(services, settings.reset_period);

    for strategy in strategies {
        let price_file = match adapter.get_string(&strategy.asset, "price_file") {
            Some(p) => p,
            None => {
                return fail(&StochtraderError::ConfigMissing {
                    section: strategy.asset.clone(),
                    key: "price_file".into(),
                });
            }
        };
        let source = match LinePriceSource::open(strategy.asset.as_str(), &price_file) {
            Ok(s) => s,
            Err(e) => return fail(&e),
        };
        let context = match AssetContext::restore(strategy, store.transactions()) {
            Ok(c) => c,
            Err(e) => return fail(&e),
        };
        scheduler.track(context, Box::new(source));
    }

    let period = std::time::Duration::from_millis(settings.sample_period_ms);
    let mut count = 0u64;
    loop {
        let now = chrono::Local::now().naive_local();
        for tx in scheduler.tick(now) {
            eprintln!("{} {} {}", tx.timestamp, tx.asset, tx.comment());
        }
        count += 1;
        if ticks.is_some_and(|limit| count >= limit) {
            break;
        }
        thread::sleep(period);
    }

    eprintln!("Stopped after {count} ticks, {} paper orders", executor.orders().len());
    for tracked in scheduler.assets() {
        let ctx = &tracked.context;
        eprintln!(
            "  {}: {}{}",
            ctx.asset(),
            ctx.position(),
            if ctx.is_suspended() { " (suspended)" } else { "" }
        );
    }
    ExitCode::SUCCESS
}

fn run_position(config_path: &Path, asset: &str) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let store = match open_store(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    match store.get_current_position(asset) {
        Ok(position) => {
            println!("{asset}: {position}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

/// Metrics of the live bot over the last `n` stored bars of `asset`.
pub fn evaluate_live(
    store: &dyn Storage,
    asset: &str,
    fee: f64,
    n: usize,
) -> Result<(usize, Metrics, Position), StochtraderError> {
    let bars = store.get_last_n_bars(n, asset)?;
    let transactions = store.get_last_n(usize::MAX, asset)?;
    let series = series_from_transactions(&bars, &transactions);
    let metrics = Metrics::compute(&series, fee)?;
    let position = series.rows.last().map_or(Position::Flat, |r| r.position);
    Ok((series.len(), metrics, position))
}

fn run_evaluate(config_path: &Path, asset: &str, n: usize) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let strategy = match build_strategy(&adapter, asset) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let store = match open_store(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    match evaluate_live(store.as_ref(), asset, strategy.fee, n) {
        Ok((bars, metrics, position)) => {
            println!("{}", format_report(asset, bars, &metrics));
            println!("Position:         {position}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

/// Reads a history file into the bar store. Returns the number of bars written.
pub fn import_history(
    store: &dyn Storage,
    reader: &CsvHistoryReader,
    asset: &str,
) -> Result<usize, StochtraderError> {
    let bars = reader.read_bars()?;
    store.insert_bars(&bars, asset)?;
    Ok(bars.len())
}

fn run_import(config_path: &Path, asset: &str, data: Option<&Path>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let reader = match history_reader(&adapter, asset, data) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    let store = match open_store(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    match import_history(store.as_ref(), &reader, asset) {
        Ok(count) => {
            eprintln!("Imported {count} bars for {asset}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}
