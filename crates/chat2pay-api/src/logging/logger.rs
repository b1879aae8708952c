use anyhow::Result;
use flume::{bounded, Receiver, Sender};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::types::ActivityLog;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Max logs held in memory before new ones are dropped
    pub queue_capacity: usize,
    pub batch_size: usize,
    /// Max wait before a partial batch is flushed
    pub batch_timeout_ms: u64,
    pub worker_count: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            batch_timeout_ms: 1000,
            worker_count: 2,
        }
    }
}

/// Fire-and-forget activity logger. Workers batch-insert queued entries into
/// Postgres. A disabled logger accepts and drops everything.
#[derive(Clone)]
pub struct ActivityLogger {
    sender: Option<Sender<ActivityLog>>,
}

impl ActivityLogger {
    /// Start background workers writing to `pool`
    pub fn new(pool: PgPool, config: LoggerConfig) -> Self {
        let (sender, receiver) = bounded(config.queue_capacity);

        info!(
            "Initializing ActivityLogger: queue={}, batch={}, timeout={}ms, workers={}",
            config.queue_capacity, config.batch_size, config.batch_timeout_ms, config.worker_count
        );

        for worker_id in 0..config.worker_count.max(1) {
            let pool = pool.clone();
            let receiver = receiver.clone();
            let config = config.clone();

            tokio::spawn(async move {
                Self::worker_loop(worker_id, pool, receiver, config).await;
            });
        }

        Self {
            sender: Some(sender),
        }
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Enqueue without blocking; a full queue drops the entry
    pub fn log(&self, activity: ActivityLog) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.try_send(activity) {
            warn!("Failed to enqueue activity log (queue full?): {}", e);
        }
    }

    async fn worker_loop(
        worker_id: usize,
        pool: PgPool,
        receiver: Receiver<ActivityLog>,
        config: LoggerConfig,
    ) {
        info!("Activity logger worker {} started", worker_id);

        let mut batch: Vec<ActivityLog> = Vec::with_capacity(config.batch_size);
        let batch_timeout = Duration::from_millis(config.batch_timeout_ms);

        loop {
            let deadline = tokio::time::Instant::now() + batch_timeout;

            while batch.len() < config.batch_size {
                match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                    Ok(Ok(log)) => batch.push(log),
                    Ok(Err(_)) => {
                        // channel closed
                        if !batch.is_empty() {
                            Self::flush_batch(&pool, &batch, worker_id).await;
                        }
                        info!("Activity logger worker {} shutting down", worker_id);
                        return;
                    }
                    Err(_) => break,
                }
            }

            if batch.is_empty() {
                sleep(Duration::from_millis(100)).await;
            } else {
                Self::flush_batch(&pool, &batch, worker_id).await;
                batch.clear();
            }
        }
    }

    async fn flush_batch(pool: &PgPool, batch: &[ActivityLog], worker_id: usize) {
        let start = std::time::Instant::now();

        match Self::insert_batch(pool, batch).await {
            Ok(inserted) => debug!(
                "Worker {} inserted {} activity logs in {:?}",
                worker_id,
                inserted,
                start.elapsed()
            ),
            Err(e) => error!("Worker {} failed to insert activity batch: {}", worker_id, e),
        }
    }

    async fn insert_batch(pool: &PgPool, logs: &[ActivityLog]) -> Result<usize> {
        let mut query_builder = sqlx::QueryBuilder::new(
            r#"
            INSERT INTO tbl_assistant_activity_logs (
                session_id, activity_type, activity_status, intent,
                message_content, response_content, product_count, max_price,
                processing_time_ms, llm_call_duration_ms, retrieval_duration_ms,
                error_message, error_type, created_at
            )
            "#,
        );

        query_builder.push_values(logs, |mut b, log| {
            b.push_bind(&log.session_id)
                .push_bind(log.activity_type.as_str())
                .push_bind(log.activity_status.as_str())
                .push_bind(&log.intent)
                .push_bind(&log.message_content)
                .push_bind(&log.response_content)
                .push_bind(log.product_count)
                .push_bind(log.max_price)
                .push_bind(log.processing_time_ms)
                .push_bind(log.llm_call_duration_ms)
                .push_bind(log.retrieval_duration_ms)
                .push_bind(&log.error_message)
                .push_bind(&log.error_type)
                .push_bind(log.created_at);
        });

        let result = query_builder.build().execute(pool).await?;

        Ok(result.rows_affected() as usize)
    }

    #[cfg(test)]
    fn queue_len(&self) -> usize {
        self.sender.as_ref().map_or(0, |s| s.len())
    }

    #[cfg(test)]
    fn detached(capacity: usize) -> (Self, Receiver<ActivityLog>) {
        let (sender, receiver) = bounded(capacity);
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::types::ActivityType;

    #[test]
    fn test_disabled_logger_drops_silently() {
        let logger = ActivityLogger::disabled();
        logger.log(ActivityLog::builder("s1", ActivityType::MessageSent).build());
        assert_eq!(logger.queue_len(), 0);
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let (logger, receiver) = ActivityLogger::detached(1);
        logger.log(ActivityLog::builder("s1", ActivityType::RequestReceived).build());
        logger.log(ActivityLog::builder("s1", ActivityType::MessageSent).build());

        assert_eq!(logger.queue_len(), 1);
        let queued = receiver.try_recv().unwrap();
        assert_eq!(queued.activity_type, ActivityType::RequestReceived);
    }
}
