use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use posture_config::AppConfig;
use posture_engine::{PostureEngine, PostureSession};
use posture_metrics::{
    AggregationWindows, BucketAverage, JsonLinesStore, MemoryStore, ReadingStore,
    ReadingsHistory,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Build the history, restoring persisted readings when a store is configured.
fn open_history(config: &AppConfig) -> Result<(ReadingsHistory, Box<dyn ReadingStore>)> {
    let offset = FixedOffset::east_opt(config.history.utc_offset_minutes * 60)
        .context("utc_offset_minutes is out of range")?;
    let windows = AggregationWindows {
        hourly_start_hour: config.history.hourly_start_hour,
        daily_days: config.history.daily_days,
        weekly_weeks: config.history.weekly_weeks,
    };
    let mut history = ReadingsHistory::new(offset, windows);

    let store: Box<dyn ReadingStore> = match &config.history.store_path {
        Some(path) => {
            let store = JsonLinesStore::new(path);
            match store.load() {
                Ok(records) => {
                    let restored = history.restore(records);
                    info!(restored, path = ?store.path(), "History restored");
                }
                // Live scoring does not depend on old readings.
                Err(e) => warn!(%e, "Failed to restore history, starting empty"),
            }
            Box::new(store)
        }
        None => Box::new(MemoryStore::default()),
    };
    Ok((history, store))
}

/// Feed a recorded capture (back-to-back frames) through the session.
async fn replay(session: &PostureSession, path: &Path) -> Result<usize> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let frame_len = session.frame_len();
    let chunks = bytes.chunks_exact(frame_len);
    if !chunks.remainder().is_empty() {
        warn!(
            trailing = chunks.remainder().len(),
            frame_len, "Capture ends with a partial frame, ignoring it"
        );
    }

    let mut frames = 0;
    for frame in chunks {
        session.submit(frame.to_vec()).await?;
        frames += 1;
    }
    Ok(frames)
}

fn log_averages(window: &str, points: &[BucketAverage]) {
    for point in points {
        let averages = point.or_zero();
        info!(
            window,
            label = %point.label,
            count = point.count,
            composite = averages.composite,
            spinal = averages.spinal_straightness,
            hunch = averages.hunch,
            shoulder = averages.shoulder_balance,
            "Posture average"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "posture_vest=info,posture_engine=info,posture_imu=info,posture_metrics=info"
                    .into()
            }),
        )
        .init();

    info!("Posture vest starting");

    // Load config.
    let config = posture_config::load_config().unwrap_or_else(|e| {
        warn!(?e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    info!(
        layout = ?config.sensors.layout,
        sensors = config.sensors.sensor_count(),
        "Config loaded"
    );

    let engine = PostureEngine::from_config(&config)?;
    let (history, store) = open_history(&config)?;
    let session = PostureSession::spawn(
        engine,
        history,
        store,
        config.session.frame_queue_capacity,
    );

    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(capture) => {
            let frames = replay(&session, &capture).await?;
            info!(frames, capture = %capture.display(), "Capture replayed");
        }
        None => {
            // Frames arrive from the Bluetooth transport, which lives outside this binary.
            info!("No capture given, waiting for Ctrl-C");
            tokio::signal::ctrl_c().await?;
        }
    }

    let history = session.history();
    session.shutdown().await?;

    // Save config on exit so a fresh install leaves an editable file behind.
    if let Err(e) = posture_config::save_config(&config) {
        warn!(?e, "Failed to save config");
    }

    let history = history.read().await;
    let now = Utc::now();
    log_averages("hourly", &history.hourly_averages(now));
    log_averages("daily", &history.daily_averages(now));
    log_averages("weekly", &history.weekly_averages(now));

    Ok(())
}
