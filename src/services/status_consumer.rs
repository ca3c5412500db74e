use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::core::broker::consumer::{self, ConsumerOptions, DeliveryHandler};
use crate::core::broker::{Broker, BrokerError, Delivery};
use crate::schemas::work::SubmissionStatusUpdate;
use crate::services::distributor::RealtimeDistributor;

/// Forwards worker status events from the broker to the realtime distributor.
///
/// Malformed payloads are logged and acknowledged.
pub(crate) struct StatusUpdateHandler {
    distributor: RealtimeDistributor,
}

impl StatusUpdateHandler {
    pub(crate) fn new(distributor: RealtimeDistributor) -> Self {
        Self { distributor }
    }
}

#[async_trait]
impl DeliveryHandler for StatusUpdateHandler {
    async fn handle(&self, delivery: &Delivery) {
        metrics::counter!("status_updates_received_total").increment(1);

        let update = match serde_json::from_slice::<SubmissionStatusUpdate>(&delivery.payload) {
            Ok(update) => update,
            Err(err) => {
                metrics::counter!("status_updates_malformed_total").increment(1);
                tracing::warn!(
                    delivery_id = %delivery.id,
                    bytes = delivery.payload.len(),
                    error = %err,
                    "Dropping malformed status update"
                );
                return;
            }
        };

        tracing::debug!(
            submission_id = %update.submission_uuid,
            status = update.submission_status.as_str(),
            delivery_id = %delivery.id,
            "Status update received"
        );
        self.distributor.send_update(update);
    }
}

pub(crate) async fn run(
    broker: Arc<dyn Broker>,
    options: ConsumerOptions,
    distributor: RealtimeDistributor,
    shutdown: watch::Receiver<bool>,
) -> Result<(), BrokerError> {
    let handler = Arc::new(StatusUpdateHandler::new(distributor));
    consumer::run(broker, options, handler, shutdown).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::watch;
    use tokio::time::{sleep, timeout};
    use uuid::Uuid;

    use super::run;
    use crate::core::broker::consumer::ConsumerOptions;
    use crate::core::broker::memory::MemoryBroker;
    use crate::core::broker::Broker;
    use crate::db::types::SubmissionStatus;
    use crate::schemas::work::SubmissionStatusUpdate;
    use crate::services::distributor::RealtimeDistributor;

    const QUEUE: &str = "submission-real-time-updates";

    fn options() -> ConsumerOptions {
        ConsumerOptions {
            queue: QUEUE.to_string(),
            consumer: "api-1".to_string(),
            prefetch: 4,
            block: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn valid_updates_reach_subscribers_and_are_acked() {
        let broker = Arc::new(MemoryBroker::new());
        let (distributor, task) = RealtimeDistributor::new(16, 4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(task.run(shutdown_rx.clone()));

        let id = Uuid::new_v4();
        let channel = distributor.create_channel(id).await.expect("channel");
        let consumer = tokio::spawn(run(broker.clone(), options(), distributor, shutdown_rx));

        let update = SubmissionStatusUpdate {
            submission_uuid: id,
            submission_status: SubmissionStatus::Success,
            passing: Some(true),
            stdout: Some("all green".to_string()),
            sequence: Some(1),
            extra: serde_json::json!({ "duration_ms": 42 })
                .as_object()
                .cloned()
                .unwrap_or_default(),
        };
        broker
            .publish(QUEUE, serde_json::to_vec(&update).expect("json"))
            .await
            .expect("publish");

        let received = timeout(Duration::from_secs(2), channel.recv())
            .await
            .expect("delivered")
            .expect("open");
        assert_eq!(received, update);

        shutdown_tx.send(true).expect("shutdown");
        consumer.await.expect("join").expect("consumer");
        assert_eq!(broker.outstanding(QUEUE), 0);
    }

    #[tokio::test]
    async fn malformed_updates_are_acked_and_dropped() {
        let broker = Arc::new(MemoryBroker::new());
        let (distributor, task) = RealtimeDistributor::new(16, 4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(task.run(shutdown_rx.clone()));

        broker.publish(QUEUE, b"not json".to_vec()).await.expect("publish");
        broker
            .publish(QUEUE, br#"{"submission_uuid":"nope","submission_status":"running"}"#.to_vec())
            .await
            .expect("publish");

        let consumer = tokio::spawn(run(broker.clone(), options(), distributor, shutdown_rx));

        let drained = async {
            while broker.outstanding(QUEUE) > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        };
        timeout(Duration::from_secs(2), drained).await.expect("poison messages acked");

        shutdown_tx.send(true).expect("shutdown");
        consumer.await.expect("join").expect("consumer");
    }
}
