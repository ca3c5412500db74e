use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

use super::{Broker, BrokerError, Delivery, ReadFrom};

/// In-process broker with the same pending/ack semantics as the stream broker.
#[derive(Default)]
pub(crate) struct MemoryBroker {
    queues: Mutex<HashMap<String, QueueState>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    notify: Notify,
    unavailable: AtomicBool,
}

#[derive(Default)]
struct QueueState {
    next_seq: u64,
    ready: VecDeque<(u64, Vec<u8>)>,
    pending: HashMap<String, BTreeMap<u64, Vec<u8>>>,
}

impl MemoryBroker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every payload ever published to `queue`, in publish order.
    pub(crate) fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        self.published
            .lock()
            .expect("published lock")
            .iter()
            .filter(|(name, _)| name == queue)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Messages not yet acknowledged, delivered or not.
    pub(crate) fn outstanding(&self, queue: &str) -> usize {
        let queues = self.queues.lock().expect("queues lock");
        queues.get(queue).map_or(0, |state| {
            state.ready.len() + state.pending.values().map(BTreeMap::len).sum::<usize>()
        })
    }

    fn check_available(&self) -> Result<(), BrokerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("memory broker offline".to_string()));
        }
        Ok(())
    }

    fn take(&self, queue: &str, consumer: &str, from: &ReadFrom, max: usize) -> Vec<Delivery> {
        let mut queues = self.queues.lock().expect("queues lock");
        let state = queues.entry(queue.to_string()).or_default();

        match from {
            ReadFrom::Pending { after } => {
                let after = parse_id(after);
                state
                    .pending
                    .get(consumer)
                    .map(|entries| {
                        entries
                            .range(after + 1..)
                            .take(max)
                            .map(|(seq, payload)| Delivery {
                                id: format_id(*seq),
                                payload: payload.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            }
            ReadFrom::New => {
                let mut taken = Vec::new();
                while taken.len() < max {
                    let Some((seq, payload)) = state.ready.pop_front() else {
                        break;
                    };
                    state
                        .pending
                        .entry(consumer.to_string())
                        .or_default()
                        .insert(seq, payload.clone());
                    taken.push(Delivery { id: format_id(seq), payload });
                }
                taken
            }
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.check_available()?;
        self.queues.lock().expect("queues lock").entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<String, BrokerError> {
        self.check_available()?;
        let id = {
            let mut queues = self.queues.lock().expect("queues lock");
            let state = queues.entry(queue.to_string()).or_default();
            state.next_seq += 1;
            state.ready.push_back((state.next_seq, payload.clone()));
            format_id(state.next_seq)
        };
        self.published.lock().expect("published lock").push((queue.to_string(), payload));
        self.notify.notify_waiters();
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
        self.check_available()?;
        let deadline = Instant::now() + block;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let taken = self.take(queue, consumer, from, max);
            if !taken.is_empty() || matches!(from, ReadFrom::Pending { .. }) {
                return Ok(taken);
            }

            if timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, queue: &str, delivery_id: &str) -> Result<(), BrokerError> {
        self.check_available()?;
        let seq = parse_id(delivery_id);
        let mut queues = self.queues.lock().expect("queues lock");
        if let Some(state) = queues.get_mut(queue) {
            for entries in state.pending.values_mut() {
                entries.remove(&seq);
            }
        }
        Ok(())
    }
}

fn format_id(seq: u64) -> String {
    format!("{seq}-0")
}

fn parse_id(id: &str) -> u64 {
    id.split('-').next().and_then(|seq| seq.parse().ok()).unwrap_or(0)
}
