use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{
    events::EnrichedEvent,
    workers::{SubscriptionSpec, WorkerBatch, WorkerInputs},
};

/// An event-bus subscriber running on its own task.
#[async_trait]
pub trait Worker: Send + Sized + 'static {
    const SUBSCRIBER_ID: &'static str;

    fn subscription() -> SubscriptionSpec;

    async fn handle(&mut self, event: Arc<EnrichedEvent>) -> Result<()>;

    /// Called once after shutdown, when the inboxes have been drained.
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    async fn dispatch(&mut self, batch: WorkerBatch) {
        let events = match batch {
            WorkerBatch::Snapshots(updates) => updates.into_iter().map(|u| u.event).collect(),
            WorkerBatch::FifoItem { event, .. } => vec![event],
        };

        for event in events {
            let event_type = event.event.event_type();
            if let Err(e) = self.handle(event).await {
                log::warn!("{} failed on {event_type}: {e:#}", Self::SUBSCRIBER_ID);
            }
        }
    }

    async fn run(
        mut self,
        mut inputs: WorkerInputs,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                batch = inputs.next() => self.dispatch(batch).await,
                _ = shutdown.recv() => {
                    while let Some(batch) = inputs.poll_ready() {
                        self.dispatch(batch).await;
                    }
                    return self.finish().await;
                }
            }
        }
    }
}
