use anyhow::Result;
use colored::Colorize;
use focusclock::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load configuration. An optional TOML path may be passed as the first argument.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SessionConfig::load(config_path.as_deref())?;
    info!("Loaded configuration: {:?}", config);

    // 3. Create the engine with a snapshot file so restarts pick up where they left off.
    let file_store = JsonFileStore::new("focusclock-session.json");
    info!("Persisting session snapshots to {}", file_store.path().display());
    let store: Arc<dyn SnapshotStore> = Arc::new(file_store);
    let engine = FocusclockEngine::with_parts(config, SystemTimeSource, Some(store));

    // 4. Spawn concurrent tasks to listen to the event streams.
    spawn_event_listeners(&engine).await;

    // 5. Run the engine. Starts a work phase unless a stored session was restored.
    engine.boot().await;
    if engine.state().await == ClockState::Idle {
        engine.start(Some(Mode::Work), None).await;
    }
    engine.run().await?;

    Ok(())
}

/// Spawns a renderer-style listener on the clock events and one broadcast observer.
async fn spawn_event_listeners(engine: &FocusclockEngine) {
    let mut clock_rx = engine.subscribe_clock_events();
    tokio::spawn(async move {
        while let Ok(event) = clock_rx.recv().await {
            match event {
                ClockEvent::Tick(tick) => {
                    if tick.remaining_seconds % 10 == 0 {
                        info!(
                            "[TICK] => {} {} ({:.1}%)",
                            tick.mode.label().cyan(),
                            tick.formatted.bold(),
                            tick.progress_pct
                        );
                    }
                }
                other => info!("[CLOCK] => {:?}", other),
            }
        }
    });

    let mut observer = engine.subscribe("focusdev-observer").await;
    tokio::spawn(async move {
        while let Some(message) = observer.recv().await {
            let session = message.session();
            info!(
                "[OBSERVER] => {:?} {} with {}s remaining",
                session.state,
                session.mode,
                session.remaining_at(chrono::Utc::now().timestamp_millis())
            );
        }
    });
}
