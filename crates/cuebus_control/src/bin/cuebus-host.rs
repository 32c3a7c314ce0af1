//! Cuebus host: one JSON request per stdin line, one JSON response per
//! stdout line. Events are written to stdout after each response; logs go
//! to stderr.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use cuebus_control::CommandProcessor;
use cuebus_core::{Engine, EngineConfig, HostSettings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EVENT_QUEUE: usize = 1024;

fn main() -> anyhow::Result<()> {
    let mut settings = HostSettings::load();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("cuebus=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    info!("Starting Cuebus host");

    let config = EngineConfig {
        stream: settings.stream.clone(),
        ..Default::default()
    };
    let (sender, receiver) = crossbeam_channel::bounded(EVENT_QUEUE);
    let engine = Engine::with_cpal(config, Some(sender.clone())).context("failed to create engine")?;
    let engine = Arc::new(engine);
    let processor = CommandProcessor::with_event_sink(Arc::clone(&engine), sender);

    if settings.auto_start {
        if let Err(e) = engine.start(settings.device_name.as_deref()) {
            warn!("Auto-start failed: {}", e);
        }
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        writeln!(out, "{}", processor.handle_json(&line))?;
        for event in receiver.try_iter() {
            writeln!(out, "{}", serde_json::to_string(&event)?)?;
        }
        out.flush()?;
    }

    info!("stdin closed, shutting down");
    if let Some(device) = engine.device_config() {
        if settings.remember_device(&device) {
            if let Err(e) = settings.save() {
                warn!("Failed to save settings: {}", e);
            }
        }
    }
    engine.shutdown();
    Ok(())
}
