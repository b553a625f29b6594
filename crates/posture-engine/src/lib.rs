pub mod engine;

pub use engine::{EngineError, FrameOutcome, PostureEngine, SkeletonPose};

use anyhow::Result;
use chrono::Utc;
use posture_metrics::{PostureReading, PostureRecord, ReadingStore, ReadingsHistory};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};

/// Readings waiting for the store. Beyond this, new readings are not persisted.
const PERSIST_QUEUE_CAPACITY: usize = 1024;

/// Work items for the session worker, processed strictly in submission order.
enum SessionInput {
    Frame(Vec<u8>),
    Recalibrate,
}

/// Latest output of the session, republished after every processed frame.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub skeleton: SkeletonPose,
    /// Most recent posture reading, if any frame has been scored yet.
    pub reading: Option<PostureReading>,
    pub calibrated: bool,
    pub frames: u64,
}

/// One wearing session.
///
/// Frames and recalibration commands share a bounded FIFO consumed by a
/// single worker task that owns the [`PostureEngine`], so calibration is
/// never observed half-updated. Scored readings are appended to the shared
/// history, then handed to a separate persistence task so a slow store never
/// holds up scoring.
pub struct PostureSession {
    input_tx: mpsc::Sender<SessionInput>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    history: Arc<RwLock<ReadingsHistory>>,
    frame_len: usize,
    task: tokio::task::JoinHandle<()>,
    persist_task: tokio::task::JoinHandle<()>,
}

impl PostureSession {
    /// Start the worker. `capacity` bounds the number of queued frames.
    pub fn spawn(
        engine: PostureEngine,
        history: ReadingsHistory,
        store: Box<dyn ReadingStore>,
        capacity: usize,
    ) -> Self {
        let (input_tx, input_rx) = mpsc::channel(capacity.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let history = Arc::new(RwLock::new(history));
        let (record_tx, record_rx) = mpsc::channel(PERSIST_QUEUE_CAPACITY);
        let frame_len = engine.frame_len();

        let persist_task = tokio::spawn(persist_loop(store, record_rx));
        let task = tokio::spawn(session_loop(
            engine,
            input_rx,
            snapshot_tx,
            history.clone(),
            record_tx,
        ));
        tracing::info!(capacity, frame_len, "Posture session started");

        Self {
            input_tx,
            snapshot_rx,
            history,
            frame_len,
            task,
            persist_task,
        }
    }

    /// Bytes per frame the engine expects.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Queue a frame, waiting while the queue is full.
    pub async fn submit(&self, frame: Vec<u8>) -> Result<()> {
        self.input_tx
            .send(SessionInput::Frame(frame))
            .await
            .map_err(|_| anyhow::anyhow!("Posture session has stopped"))
    }

    /// Queue a frame without waiting. A full or closed queue hands the frame back.
    pub fn try_submit(&self, frame: Vec<u8>) -> Result<(), Vec<u8>> {
        self.input_tx
            .try_send(SessionInput::Frame(frame))
            .map_err(|e| match e.into_inner() {
                SessionInput::Frame(frame) => frame,
                // try_send hands back exactly the value sent above.
                SessionInput::Recalibrate => unreachable!("try_submit only queues frames"),
            })
    }

    /// The "configure now" command: the next queued frame becomes the reference pose.
    pub async fn recalibrate(&self) -> Result<()> {
        self.input_tx
            .send(SessionInput::Recalibrate)
            .await
            .map_err(|_| anyhow::anyhow!("Posture session has stopped"))
    }

    /// Latest snapshot (non-blocking).
    pub fn latest(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified after every processed frame.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Shared history for aggregation queries.
    pub fn history(&self) -> Arc<RwLock<ReadingsHistory>> {
        self.history.clone()
    }

    /// Close the queue, drain what is already queued, and wait for the worker
    /// and for every pending reading to reach the store.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.input_tx);
        self.task.await?;
        self.persist_task.await?;
        tracing::info!("Posture session stopped");
        Ok(())
    }
}

/// Background task: decode, fuse, score, append, publish.
async fn session_loop(
    mut engine: PostureEngine,
    mut input_rx: mpsc::Receiver<SessionInput>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    history: Arc<RwLock<ReadingsHistory>>,
    record_tx: mpsc::Sender<PostureRecord>,
) {
    while let Some(input) = input_rx.recv().await {
        let bytes = match input {
            SessionInput::Recalibrate => {
                engine.recalibrate();
                continue;
            }
            SessionInput::Frame(bytes) => bytes,
        };

        let outcome = match engine.process_frame(&bytes, Utc::now()) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(%e, len = bytes.len(), "Skipping frame");
                continue;
            }
        };

        if let Some(reading) = &outcome.reading {
            history.write().await.append(reading.clone());
            if let Err(e) = record_tx.try_send(PostureRecord::from(reading)) {
                tracing::warn!(%e, "Dropping posture reading, store is not keeping up");
            }
        }

        let frames = engine.frames_processed();
        if frames % 600 == 0 {
            tracing::debug!(frames, "Posture frames processed");
        }

        let previous = snapshot_tx.borrow().reading.clone();
        snapshot_tx.send_replace(SessionSnapshot {
            skeleton: outcome.skeleton,
            reading: outcome.reading.or(previous),
            calibrated: engine.is_calibrated(),
            frames,
        });
    }
}

/// Background task: write readings to the store on the blocking pool.
async fn persist_loop(mut store: Box<dyn ReadingStore>, mut record_rx: mpsc::Receiver<PostureRecord>) {
    while let Some(record) = record_rx.recv().await {
        let written = tokio::task::spawn_blocking(move || {
            let result = store.append(&record);
            (store, result)
        })
        .await;
        match written {
            Ok((returned, result)) => {
                store = returned;
                if let Err(e) = result {
                    tracing::warn!(%e, "Failed to persist posture reading");
                }
            }
            Err(e) => {
                tracing::error!(%e, "Reading store task failed, persistence stopped");
                return;
            }
        }
    }
}
