//! Table watcher
//!
//! Replays captured table frames from a directory through the detection
//! pipeline and writes the resulting events to stdout as JSON lines.
//!
//! Usage: table-watch <frames-dir> [config.json]

use anyhow::{anyhow, Result};
use std::io::Write;
use std::path::PathBuf;

use table_watch::config::load_config;
use table_watch::dispatch::create_event_queue;
use table_watch::ocr::ensemble_from_config;
use table_watch::pipeline::{spawn_consumer, DirectorySource, JsonLinesSink, RetryPolicy, Watcher};

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {:<5} {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();
}

fn main() -> Result<()> {
    init_logging();

    // Route panics through the logger so they end up next to the events
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        log::error!("[PANIC]{} {}", location, msg);
    }));

    let mut args = std::env::args().skip(1);
    let frames_dir = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Usage: table-watch <frames-dir> [config.json]"))?;
    let config_path = args.next().map(PathBuf::from);

    let config = load_config(config_path.as_deref());
    let source = DirectorySource::open(&frames_dir)?;
    if source.is_empty() {
        log::warn!("No PNG frames in {}", frames_dir.display());
    }

    let ensemble = ensemble_from_config(&config);
    if ensemble.registry().is_empty() {
        log::warn!("No OCR engines available; regions will read as empty");
    } else {
        log::info!("OCR engines: {}", ensemble.registry().names().join(", "));
    }

    let (publisher, receiver) = create_event_queue(config.event_queue_capacity);
    let consumer = spawn_consumer(
        receiver,
        JsonLinesSink::new(std::io::stdout()),
        RetryPolicy::default(),
    )?;

    let watcher = Watcher::new(&config, ensemble, publisher);
    let status = watcher.status();

    let worker = watcher.spawn(Box::new(source))?;
    let watcher = worker
        .join()
        .map_err(|_| anyhow!("Detection thread panicked"))?;

    // Last publisher goes with the watcher; the consumer drains and exits
    drop(watcher);
    let delivered = consumer
        .join()
        .map_err(|_| anyhow!("Event consumer panicked"))?;

    let report = status.report();
    log::info!(
        "Status: {}",
        serde_json::to_string(&report).map_err(|e| anyhow!("Failed to serialize status: {}", e))?
    );
    log::info!(
        "Done: {} cycles, {} events ({} delivered, {} dropped by sink, {} dropped by queue)",
        report.loop_stats.cycles,
        report.dispatcher.events_total,
        delivered.delivered,
        delivered.dropped,
        report.dispatcher.queue.dropped
    );

    Ok(())
}
