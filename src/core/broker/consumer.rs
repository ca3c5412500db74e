use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Semaphore};
use tokio::time::sleep;

use super::{Broker, BrokerError, Delivery, ReadFrom};

const RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub(crate) struct ConsumerOptions {
    pub(crate) queue: String,
    pub(crate) consumer: String,
    /// Upper bound on deliveries held unacknowledged at once.
    pub(crate) prefetch: usize,
    pub(crate) block: Duration,
}

#[async_trait]
pub(crate) trait DeliveryHandler: Send + Sync + 'static {
    /// Called on its own task; the delivery is acked once this returns.
    async fn handle(&self, delivery: &Delivery);
}

/// Runs a consumer until `shutdown` flips, then waits for in-flight deliveries.
///
/// Each delivery owns a semaphore permit from receipt until its ack completes,
/// which is what bounds the unacknowledged window to `prefetch`.
pub(crate) async fn run(
    broker: Arc<dyn Broker>,
    options: ConsumerOptions,
    handler: Arc<dyn DeliveryHandler>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), BrokerError> {
    let queue = options.queue.clone();

    loop {
        match broker.declare_queue(&queue).await {
            Ok(()) => break,
            Err(err) => {
                tracing::warn!(queue = %queue, error = %err, "Queue declaration failed; retrying");
                tokio::select! {
                    _ = shutdown.changed() => return Ok(()),
                    _ = sleep(RETRY_BACKOFF) => {}
                }
            }
        }
    }

    let permits = Arc::new(Semaphore::new(options.prefetch));
    let mut cursor = ReadFrom::start_of_pending();

    tracing::info!(
        queue = %queue,
        consumer = %options.consumer,
        prefetch = options.prefetch,
        "Consumer started"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        let first = tokio::select! {
            _ = shutdown.changed() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let mut held = vec![first];
        while let Ok(permit) = permits.clone().try_acquire_owned() {
            held.push(permit);
        }

        let received = tokio::select! {
            _ = shutdown.changed() => break,
            received = broker.receive(&queue, &options.consumer, &cursor, held.len(), options.block) => received,
        };

        let batch = match received {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(queue = %queue, error = %err, "Receive failed; backing off");
                drop(held);
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = sleep(RETRY_BACKOFF) => {}
                }
                continue;
            }
        };

        if let ReadFrom::Pending { .. } = cursor {
            cursor = match batch.last() {
                Some(last) => ReadFrom::Pending { after: last.id.clone() },
                None => ReadFrom::New,
            };
            if !batch.is_empty() {
                tracing::info!(queue = %queue, redelivered = batch.len(), "Recovering pending deliveries");
            }
        }

        for delivery in batch {
            let Some(permit) = held.pop() else {
                tracing::error!(queue = %queue, delivery_id = %delivery.id, "Broker returned more than requested");
                break;
            };
            let broker = broker.clone();
            let handler = handler.clone();
            let queue = queue.clone();
            tokio::spawn(async move {
                handler.handle(&delivery).await;
                if let Err(err) = broker.ack(&queue, &delivery.id).await {
                    tracing::warn!(
                        queue = %queue,
                        delivery_id = %delivery.id,
                        error = %err,
                        "Ack failed; delivery will be redelivered"
                    );
                }
                drop(permit);
            });
        }
    }

    if permits.acquire_many(options.prefetch as u32).await.is_err() {
        tracing::warn!(queue = %queue, "Consumer permits closed before drain");
    }
    tracing::info!(queue = %queue, "Consumer stopped");
    Ok(())
}
