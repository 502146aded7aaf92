use std::sync::Arc;

use clap::Parser;
use tokio::runtime::Runtime;

use signal_warden::data::CandleCacheFile;
use signal_warden::utils::time_utils::local_now_as_timestamp_ms;
use signal_warden::{CandleCache, Cli, EngineConfig, LogNotifier, MemorySink, WardenEngine};

fn main() -> anyhow::Result<()> {
    // A. Init Logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    // B. Parse Args
    let args = Cli::parse();
    #[cfg(debug_assertions)]
    log::info!("Parsed arguments: {:?}", args);

    // C. Data Loading (Blocking)
    let cache_path = args
        .cache
        .clone()
        .unwrap_or_else(CandleCacheFile::default_cache_path);
    let rt = Runtime::new()?;
    let source = rt.block_on(CandleCache::load_async(cache_path.clone())).map_err(|e| {
        anyhow::anyhow!(
            "{:#}\nNo usable cache at {:?} - run `make_demo_cache` first",
            e,
            cache_path
        )
    })?;

    // Pull the universe through the data-source trait, all three timeframes
    let universe = source.collection().unique_pair_names();
    let collection = rt.block_on(signal_warden::data::load_collection(&source, &universe));

    // D. Engine construction (config validated here)
    let sink = Arc::new(MemorySink::new());
    let mut engine = WardenEngine::new(
        EngineConfig::default(),
        collection,
        args.balance,
        sink.clone(),
        Arc::new(LogNotifier),
    )?;

    // E. One full decision cycle over the universe
    let now_ms = local_now_as_timestamp_ms();
    let pairs: Vec<String> = engine.timeseries.unique_pair_names();
    log::info!("Evaluating {} pairs", pairs.len());

    let mut signals = Vec::new();
    for pair in &pairs {
        if let Some(result) = engine.evaluate_pair(pair, now_ms) {
            signals.push(result);
        }
    }

    let candidates: Vec<&signal_warden::ConfluenceResult> =
        signals.iter().map(|s| s.as_ref()).collect();
    let decisions = engine.request_positions(&candidates, now_ms);

    // F. Risk-side feeds: baseline the portfolio and sweep for stress
    engine.update_portfolio_value(args.balance, now_ms);
    let snapshots: Vec<signal_warden::models::PairMarketSnapshot> = pairs
        .iter()
        .filter_map(|pair| {
            let series = engine.timeseries.get(pair, signal_warden::Timeframe::H4).ok()?;
            Some(signal_warden::models::PairMarketSnapshot {
                pair: pair.clone(),
                closes: series.close_prices.clone(),
                observed_at_ms: now_ms,
            })
        })
        .collect();
    let stress = engine.monitor_stress(&snapshots, now_ms);
    log::info!("Stress sweep: {} events", stress.len());

    for decision in &decisions {
        println!("{}", serde_json::to_string(decision)?);
    }
    println!("{}", serde_json::to_string(&engine.get_status())?);
    log::info!(
        "Cycle complete: {} signals, {} decisions, counters {:?}",
        signals.len(),
        decisions.len(),
        engine.counters()
    );

    Ok(())
}
