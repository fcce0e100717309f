//! In-process pub/sub for run/log events. A later pass can swap this for a
//! real broker; `tokio::sync::broadcast` is enough for a single-process
//! control plane and keeps the dependency surface flat.

use tokio::sync::broadcast;

use synqx_ids::{EphemeralJobId, JobId, StepRunId, WorkspaceId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Job(JobId),
    Step(StepRunId),
    EphemeralJob(EphemeralJobId),
    WorkspaceLogs(WorkspaceId),
}

#[derive(Debug, Clone)]
pub struct Event {
    pub topic: Topic,
    pub payload: serde_json::Value,
}

/// A single shared broadcast channel; subscribers filter by [`Topic`]
/// client-side. Fine at this scale — the alternative (one channel per
/// topic) would leak memory for every job that ever ran.
pub struct PubSub {
    sender: broadcast::Sender<Event>,
}

impl PubSub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, topic: Topic, payload: serde_json::Value) {
        // A lagging or absent subscriber is not an error: nobody may be
        // watching this topic right now.
        let _ = self.sender.send(Event { topic, payload });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_only_after_subscribing() {
        let pubsub = PubSub::new(16);
        pubsub.publish(Topic::Job(JobId::new()), serde_json::json!({"ignored": true}));

        let mut rx = pubsub.subscribe();
        let job_id = JobId::new();
        pubsub.publish(Topic::Job(job_id.clone()), serde_json::json!({"state": "RUNNING"}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, Topic::Job(job_id));
    }
}
