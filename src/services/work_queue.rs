use std::sync::Arc;

use async_trait::async_trait;

use crate::core::broker::{Broker, BrokerError};
use crate::schemas::work::SubmissionWork;

#[async_trait]
pub(crate) trait WorkQueue: Send + Sync {
    async fn queue_work(&self, work: &SubmissionWork) -> Result<(), BrokerError>;
}

/// Publishes work items to the durable submissions queue read by grading workers.
#[derive(Clone)]
pub(crate) struct WorkQueuePublisher {
    broker: Arc<dyn Broker>,
    queue: String,
}

impl WorkQueuePublisher {
    pub(crate) fn new(broker: Arc<dyn Broker>, queue: impl Into<String>) -> Self {
        Self { broker, queue: queue.into() }
    }

    /// Creates the queue up front so items published before any worker starts are kept.
    pub(crate) async fn declare(&self) -> Result<(), BrokerError> {
        self.broker.declare_queue(&self.queue).await
    }
}

#[async_trait]
impl WorkQueue for WorkQueuePublisher {
    async fn queue_work(&self, work: &SubmissionWork) -> Result<(), BrokerError> {
        let payload = serde_json::to_vec(work)?;

        match self.broker.publish(&self.queue, payload).await {
            Ok(message_id) => {
                metrics::counter!("work_items_published_total").increment(1);
                tracing::info!(
                    submission_id = %work.submission_uuid,
                    queue = %self.queue,
                    message_id = %message_id,
                    "Queued submission work"
                );
                Ok(())
            }
            Err(err) => {
                metrics::counter!("work_items_publish_failed_total").increment(1);
                tracing::error!(
                    submission_id = %work.submission_uuid,
                    queue = %self.queue,
                    error = %err,
                    "Failed to queue submission work"
                );
                Err(err)
            }
        }
    }
}
