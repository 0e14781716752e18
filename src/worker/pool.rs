use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::audio::AudioLimits;
use crate::messaging::Job;
use crate::metrics::Metrics;
use crate::records::RecordStore;
use crate::shutdown::ShutdownSignal;
use crate::storage::ObjectStore;
use crate::whisper::WhisperEngine;

use super::task;

/// Everything a worker needs to execute one job. Cloned into each worker
/// task; every field is cheap to clone (shared handles or `Copy`).
#[derive(Clone)]
pub struct WorkerContext {
    pub engine: WhisperEngine,
    pub store: ObjectStore,
    pub records: RecordStore,
    pub limits: AudioLimits,
    pub metrics: Arc<Metrics>,
}

/// Fixed-size pool of transcription workers fed from the consumer channel.
///
/// Jobs flow through an internal bounded channel sized at twice the worker
/// count, which is the backpressure point: when every worker is busy and the
/// buffer is full, the forward loop stalls and unacked deliveries pile up at
/// the broker instead of in this process.
pub struct WorkerPool {
    ctx: WorkerContext,
    workers_count: usize,
}

impl WorkerPool {
    pub fn new(ctx: WorkerContext, workers_count: usize) -> Self {
        Self {
            ctx,
            workers_count: workers_count.max(1),
        }
    }

    /// Runs until shutdown triggers or the job source closes, then drains:
    /// jobs already handed to workers finish before this returns.
    pub async fn run(self, mut jobs: mpsc::Receiver<Job>, mut shutdown: ShutdownSignal) {
        let (tx, rx) = mpsc::channel::<Job>(self.workers_count * 2);
        let rx = Arc::new(Mutex::new(rx));

        let mut handles = Vec::with_capacity(self.workers_count);
        for worker_id in 0..self.workers_count {
            let rx = rx.clone();
            let ctx = self.ctx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    // Lock only to receive; released before the job runs so
                    // the other workers keep pulling.
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(job) => task::process(worker_id, job, &ctx).await,
                        None => break,
                    }
                }
                tracing::info!("👷 Worker {worker_id} stopped");
            }));
        }
        tracing::info!("👷 Worker pool started ({} workers)", self.workers_count);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    tracing::info!("🛑 Worker pool draining");
                    break;
                }
                job = jobs.recv() => match job {
                    Some(job) => {
                        if tx.send(job).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        tracing::info!("📥 Job source closed, worker pool draining");
                        break;
                    }
                },
            }
        }

        // Closing the internal channel lets each worker finish its current
        // job and exit.
        drop(tx);
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!("❌ Worker task panicked: {err}");
            }
        }
        tracing::info!("🛑 Worker pool stopped");
    }
}
