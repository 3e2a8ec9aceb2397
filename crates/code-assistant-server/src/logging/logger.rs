use flume::{bounded, Receiver, Sender};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ActivityLogConfig;
use super::types::ActivityLog;

/// Async activity logger with queue mechanism.
///
/// `log` never blocks the request path: events go into a bounded queue and
/// background workers write them out in batches as `activity` tracing
/// records.
#[derive(Clone)]
pub struct ActivityLogger {
    sender: Option<Sender<ActivityLog>>,
}

impl ActivityLogger {
    /// Spawn workers on the current tokio runtime
    pub fn new(config: &ActivityLogConfig) -> Self {
        if !config.enabled {
            info!("Activity logging disabled");
            return Self::disabled();
        }

        let (sender, receiver) = bounded(config.queue_capacity.max(1));

        info!(
            "Initializing ActivityLogger: queue={}, batch={}, timeout={}ms, workers={}",
            config.queue_capacity, config.batch_size, config.batch_timeout_ms, config.worker_count
        );

        for worker_id in 0..config.worker_count.max(1) {
            let receiver = receiver.clone();
            let batch_size = config.batch_size.max(1);
            let batch_timeout = Duration::from_millis(config.batch_timeout_ms.max(1));

            tokio::spawn(async move {
                Self::worker_loop(worker_id, receiver, batch_size, batch_timeout).await;
            });
        }

        Self { sender: Some(sender) }
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Logger without workers; the caller drains the receiver
    pub fn detached(capacity: usize) -> (Self, Receiver<ActivityLog>) {
        let (sender, receiver) = bounded(capacity.max(1));
        (Self { sender: Some(sender) }, receiver)
    }

    /// Fire-and-forget; drops the event when the queue is full
    pub fn log(&self, activity: ActivityLog) {
        let Some(sender) = &self.sender else {
            return;
        };

        if let Err(e) = sender.try_send(activity) {
            warn!("Failed to enqueue activity log (queue full?): {}", e);
        }
    }

    pub fn queue_len(&self) -> usize {
        self.sender.as_ref().map_or(0, |s| s.len())
    }

    async fn worker_loop(
        worker_id: usize,
        receiver: Receiver<ActivityLog>,
        batch_size: usize,
        batch_timeout: Duration,
    ) {
        debug!("Activity worker {} started", worker_id);

        let mut batch: Vec<ActivityLog> = Vec::with_capacity(batch_size);

        loop {
            // Block for the first event, then fill the batch until the deadline
            match receiver.recv_async().await {
                Ok(log) => batch.push(log),
                Err(_) => {
                    debug!("Activity worker {} shutting down (channel closed)", worker_id);
                    return;
                }
            }

            let deadline = tokio::time::Instant::now() + batch_timeout;
            let mut closed = false;
            while batch.len() < batch_size {
                match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                    Ok(Ok(log)) => batch.push(log),
                    Ok(Err(_)) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            Self::flush_batch(&batch);
            batch.clear();

            if closed {
                debug!("Activity worker {} shutting down (channel closed)", worker_id);
                return;
            }
        }
    }

    fn flush_batch(batch: &[ActivityLog]) {
        for log in batch {
            info!(
                target: "activity",
                session_id = %log.session_id,
                request_id = log.request_id.as_deref().unwrap_or(""),
                activity_type = log.activity_type.as_str(),
                activity_status = log.activity_status.as_str(),
                token_count = log.token_count,
                history_included = log.history_included,
                turns_trimmed = log.turns_trimmed,
                processing_time_ms = log.processing_time_ms,
                error_message = log.error_message.as_deref(),
                created_at = %log.created_at,
                "activity"
            );
        }
    }
}
