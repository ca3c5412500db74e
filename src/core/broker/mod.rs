//! Durable work/status queues.
//!
//! Queues are Redis streams read through one consumer group per queue. A
//! delivery stays pending for its consumer until it is acknowledged, so a crash
//! between handling and `ack` redelivers it on the next start.

pub(crate) mod consumer;
#[cfg(test)]
pub(crate) mod memory;
mod redis_streams;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub(crate) use redis_streams::RedisStreamBroker;

#[derive(Debug, Error)]
pub(crate) enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("broker operation timed out")]
    Timeout,
    #[error("failed to encode message: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            BrokerError::Timeout
        } else {
            BrokerError::Unavailable(err.to_string())
        }
    }
}

/// A message handed to a consumer and not yet acknowledged.
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    pub(crate) id: String,
    pub(crate) payload: Vec<u8>,
}

/// Where a `receive` call reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReadFrom {
    /// Entries already delivered to this consumer and never acked, after the given id.
    Pending { after: String },
    /// Entries never delivered to any consumer of the group.
    New,
}

impl ReadFrom {
    pub(crate) fn start_of_pending() -> Self {
        ReadFrom::Pending { after: "0".to_string() }
    }
}

#[async_trait]
pub(crate) trait Broker: Send + Sync {
    /// Creates the queue and its consumer group if missing. Idempotent.
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError>;

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<String, BrokerError>;

    /// Returns at most `max` deliveries, waiting up to `block` for new ones.
    async fn receive(
        &self,
        queue: &str,
        consumer: &str,
        from: &ReadFrom,
        max: usize,
        block: Duration,
    ) -> Result<Vec<Delivery>, BrokerError>;

    async fn ack(&self, queue: &str, delivery_id: &str) -> Result<(), BrokerError>;
}
