//! In-process fan-out of worker status updates to live subscribers.
//!
//! One task owns the registry. Subscribe and unsubscribe travel over a command
//! channel, updates over a bounded ingress, so registry access is never shared.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use uuid::Uuid;

use crate::schemas::work::SubmissionStatusUpdate;

#[derive(Debug, Error)]
pub(crate) enum DistributorError {
    #[error("realtime distributor is not running")]
    Stopped,
}

/// Delivery channel for one submission. Clones share the same receiver.
#[derive(Clone)]
pub(crate) struct SubmissionChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    submission_id: Uuid,
    receiver: Mutex<mpsc::Receiver<SubmissionStatusUpdate>>,
}

impl SubmissionChannel {
    fn new(submission_id: Uuid, receiver: mpsc::Receiver<SubmissionStatusUpdate>) -> Self {
        Self { inner: Arc::new(ChannelInner { submission_id, receiver: Mutex::new(receiver) }) }
    }

    pub(crate) fn submission_id(&self) -> Uuid {
        self.inner.submission_id
    }

    /// Next update, or `None` once the channel has been deleted and drained.
    pub(crate) async fn recv(&self) -> Option<SubmissionStatusUpdate> {
        self.inner.receiver.lock().await.recv().await
    }

    pub(crate) fn same_channel(&self, other: &SubmissionChannel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

enum Command {
    Create { submission_id: Uuid, reply: oneshot::Sender<SubmissionChannel> },
    Delete { submission_id: Uuid, expected: Option<SubmissionChannel> },
}

/// Cloneable handle to the distributor task.
#[derive(Clone)]
pub(crate) struct RealtimeDistributor {
    commands: mpsc::UnboundedSender<Command>,
    ingress: mpsc::Sender<SubmissionStatusUpdate>,
}

pub(crate) struct DistributorTask {
    commands: mpsc::UnboundedReceiver<Command>,
    ingress: mpsc::Receiver<SubmissionStatusUpdate>,
    registry: HashMap<Uuid, Registration>,
    channel_capacity: usize,
}

struct Registration {
    sender: mpsc::Sender<SubmissionStatusUpdate>,
    channel: SubmissionChannel,
    last_sequence: Option<u64>,
}

impl RealtimeDistributor {
    pub(crate) fn new(ingress_capacity: usize, channel_capacity: usize) -> (Self, DistributorTask) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (ingress_tx, ingress_rx) = mpsc::channel(ingress_capacity.max(1));

        let handle = Self { commands: commands_tx, ingress: ingress_tx };
        let task = DistributorTask {
            commands: commands_rx,
            ingress: ingress_rx,
            registry: HashMap::new(),
            channel_capacity: channel_capacity.max(1),
        };
        (handle, task)
    }

    /// Returns the registered channel for `submission_id`, creating it if needed.
    ///
    /// Every subscriber to one submission shares the same channel.
    pub(crate) async fn create_channel(
        &self,
        submission_id: Uuid,
    ) -> Result<SubmissionChannel, DistributorError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Create { submission_id, reply })
            .map_err(|_| DistributorError::Stopped)?;
        response.await.map_err(|_| DistributorError::Stopped)
    }

    /// Unregisters and closes the channel. Unknown ids are ignored.
    pub(crate) fn delete_channel(&self, submission_id: Uuid) {
        self.send_delete(submission_id, None);
    }

    /// Deletes the channel only while `channel` is still the registered one.
    pub(crate) fn release_channel(&self, channel: &SubmissionChannel) {
        self.send_delete(channel.submission_id(), Some(channel.clone()));
    }

    fn send_delete(&self, submission_id: Uuid, expected: Option<SubmissionChannel>) {
        if self.commands.send(Command::Delete { submission_id, expected }).is_err() {
            tracing::debug!(submission_id = %submission_id, "Distributor stopped; delete ignored");
        }
    }

    /// Hands the update to the dispatch loop without waiting. Drops it when ingress is full.
    pub(crate) fn send_update(&self, update: SubmissionStatusUpdate) {
        match self.ingress.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(update)) => {
                metrics::counter!("realtime_updates_dropped_total", "reason" => "ingress_full")
                    .increment(1);
                tracing::warn!(
                    submission_id = %update.submission_uuid,
                    "Realtime ingress full; dropping update"
                );
            }
            Err(TrySendError::Closed(update)) => {
                metrics::counter!("realtime_updates_dropped_total", "reason" => "stopped")
                    .increment(1);
                tracing::debug!(
                    submission_id = %update.submission_uuid,
                    "Distributor stopped; dropping update"
                );
            }
        }
    }
}

impl DistributorTask {
    pub(crate) async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Realtime distributor started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                update = self.ingress.recv() => match update {
                    Some(update) => self.forward(update),
                    None => break,
                },
            }
        }

        let open = self.registry.len();
        self.registry.clear();
        tracing::info!(open_channels = open, "Realtime distributor stopped");
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Create { submission_id, reply } => {
                let capacity = self.channel_capacity;
                let registration = self.registry.entry(submission_id).or_insert_with(|| {
                    let (sender, receiver) = mpsc::channel(capacity);
                    tracing::debug!(submission_id = %submission_id, "Registered realtime channel");
                    Registration {
                        sender,
                        channel: SubmissionChannel::new(submission_id, receiver),
                        last_sequence: None,
                    }
                });
                // Requester may have gone away; the registration stays until deleted.
                let _ = reply.send(registration.channel.clone());
            }
            Command::Delete { submission_id, expected } => {
                let matches = match (self.registry.get(&submission_id), &expected) {
                    (Some(registered), Some(expected)) => registered.channel.same_channel(expected),
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if matches {
                    self.registry.remove(&submission_id);
                    tracing::debug!(submission_id = %submission_id, "Removed realtime channel");
                }
            }
        }
    }

    fn forward(&mut self, update: SubmissionStatusUpdate) {
        let submission_id = update.submission_uuid;
        let Some(registration) = self.registry.get_mut(&submission_id) else {
            metrics::counter!("realtime_updates_dropped_total", "reason" => "no_subscriber")
                .increment(1);
            return;
        };

        if let (Some(incoming), Some(last)) = (update.sequence, registration.last_sequence) {
            if incoming <= last {
                metrics::counter!("realtime_updates_dropped_total", "reason" => "stale")
                    .increment(1);
                tracing::debug!(
                    submission_id = %submission_id,
                    sequence = incoming,
                    last_sequence = last,
                    "Dropping stale update"
                );
                return;
            }
        }
        let sequence = update.sequence;

        match registration.sender.try_send(update) {
            Ok(()) => {
                if sequence.is_some() {
                    registration.last_sequence = sequence;
                }
                metrics::counter!("realtime_updates_delivered_total").increment(1);
            }
            Err(TrySendError::Full(_)) => {
                metrics::counter!("realtime_updates_dropped_total", "reason" => "subscriber_full")
                    .increment(1);
                tracing::warn!(submission_id = %submission_id, "Subscriber lagging; dropping update");
            }
            Err(TrySendError::Closed(_)) => {
                self.registry.remove(&submission_id);
            }
        }
    }
}
