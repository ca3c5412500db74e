use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;

use super::{Broker, BrokerError, Delivery, ReadFrom};
use crate::core::redis::RedisHandle;

const PAYLOAD_FIELD: &str = "payload";

/// Stream-backed broker. `reader` is only used for `XREADGROUP`, which may block.
#[derive(Clone)]
pub(crate) struct RedisStreamBroker {
    publisher: RedisHandle,
    reader: RedisHandle,
    group: String,
}

impl RedisStreamBroker {
    pub(crate) fn new(publisher: RedisHandle, reader: RedisHandle, group: impl Into<String>) -> Self {
        Self { publisher, reader, group: group.into() }
    }

    async fn connection(handle: &RedisHandle) -> Result<ConnectionManager, BrokerError> {
        handle
            .connection()
            .await
            .ok_or_else(|| BrokerError::Unavailable("redis is not connected".to_string()))
    }
}

#[async_trait]
impl Broker for RedisStreamBroker {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let mut conn = Self::connection(&self.publisher).await?;
        // Group starts at 0 so work published before the first consumer is not skipped.
        let created = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(queue)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async::<_, ()>(&mut conn)
            .await;

        match created {
            Ok(()) => {
                tracing::info!(queue, group = %self.group, "Declared queue");
                Ok(())
            }
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<String, BrokerError> {
        let mut conn = Self::connection(&self.publisher).await?;
        let id = redis::cmd("XADD")
            .arg(queue)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(id)
    }

    async fn receive(
        &self,
        queue: &str,
        consumer: &str,
        from: &ReadFrom,
        max: usize,
        block: Duration,
    ) -> Result<Vec<Delivery>, BrokerError> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let mut conn = Self::connection(&self.reader).await?;
        let mut options = StreamReadOptions::default().group(&self.group, consumer).count(max);
        let id = match from {
            ReadFrom::Pending { after } => after.as_str(),
            ReadFrom::New => {
                options = options.block(block.as_millis() as usize);
                ">"
            }
        };

        let reply: Option<StreamReadReply> = conn.xread_options(&[queue], &[id], &options).await?;
        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let mut deliveries = Vec::new();
        for stream in reply.keys {
            for entry in stream.ids {
                match entry.get::<Vec<u8>>(PAYLOAD_FIELD) {
                    Some(payload) => deliveries.push(Delivery { id: entry.id, payload }),
                    None => {
                        tracing::warn!(queue, delivery_id = %entry.id, "Stream entry without payload; acking");
                        self.ack(queue, &entry.id).await?;
                    }
                }
            }
        }

        Ok(deliveries)
    }

    async fn ack(&self, queue: &str, delivery_id: &str) -> Result<(), BrokerError> {
        let mut conn = Self::connection(&self.publisher).await?;
        redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(queue)
            .arg(&self.group)
            .arg(delivery_id)
            .ignore()
            .cmd("XDEL")
            .arg(queue)
            .arg(delivery_id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}
