//! Background flush task for the message buffer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use engage_core::defaults::FLUSHER_MAX_IDLE_MS;
use engage_core::{Error, Result};

use crate::buffer::{BufferEvent, MessageBuffer};

/// Handle for controlling a running flusher.
pub struct FlusherHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<BufferEvent>,
    task: JoinHandle<()>,
}

impl FlusherHandle {
    /// Stop the flusher and wait until it has closed the buffer.
    pub async fn shutdown(self) -> Result<()> {
        // A send error means the task already exited.
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Flusher task failed: {}", e)))
    }

    /// Get a receiver for buffer events.
    pub fn events(&self) -> broadcast::Receiver<BufferEvent> {
        self.event_rx.resubscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Start the background flusher for `buffer`.
///
/// The task flushes whenever the buffer requests it or the flush interval
/// elapses. On [`FlusherHandle::shutdown`], or when the handle is dropped, it
/// closes the buffer (one final flush) and exits.
pub fn spawn_flusher(buffer: Arc<MessageBuffer>) -> FlusherHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
    let event_rx = buffer.subscribe();

    let task = tokio::spawn(async move {
        run(buffer, &mut shutdown_rx).await;
    });

    FlusherHandle {
        shutdown_tx,
        event_rx,
        task,
    }
}

async fn run(buffer: Arc<MessageBuffer>, shutdown_rx: &mut mpsc::Receiver<()>) {
    let config = buffer.config();
    info!(
        subsystem = "buffer",
        component = "flusher",
        batch_size = config.batch_size,
        max_size = config.max_size,
        flush_interval_ms = config.flush_interval_ms,
        "Message flusher started"
    );

    let max_idle = Duration::from_millis(FLUSHER_MAX_IDLE_MS);

    loop {
        let wait = buffer.until_due().min(max_idle);

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!(subsystem = "buffer", component = "flusher", "Flusher received shutdown signal");
                break;
            }
            _ = buffer.flush_signal().notified() => {
                debug!(subsystem = "buffer", component = "flusher", "Flush requested");
            }
            _ = sleep(wait) => {
                if !buffer.flush_due() {
                    continue;
                }
                debug!(subsystem = "buffer", component = "flusher", "Flush interval elapsed");
            }
        }

        // The buffer logs and re-enqueues on failure; the next trigger retries.
        if let Err(e) = buffer.flush().await {
            debug!(
                subsystem = "buffer",
                component = "flusher",
                error = %e,
                "Scheduled flush failed"
            );
        }
    }

    match buffer.close().await {
        Ok(report) => info!(
            subsystem = "buffer",
            component = "flusher",
            final_events = report.events,
            "Message flusher stopped"
        ),
        Err(e) => error!(
            subsystem = "buffer",
            component = "flusher",
            error = %e,
            "Message flusher stopped, final flush failed"
        ),
    }
}
