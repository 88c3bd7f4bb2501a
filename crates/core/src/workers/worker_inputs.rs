use std::sync::Arc;

use tokio::sync::Notify;

use crate::{
    events::EnrichedEvent,
    queues::{FifoDropOldestReceiver, Latest1Queue},
};

pub struct Latest1Input {
    pub event_type: &'static str,
    pub queue: Arc<Latest1Queue<Arc<EnrichedEvent>>>,
}

pub struct FifoInput {
    pub event_type: &'static str,
    pub receiver: FifoDropOldestReceiver<Arc<EnrichedEvent>>,
}

pub struct WorkerInputs {
    latest: Vec<Latest1Input>,
    fifos: Vec<FifoInput>,
    notify_any: Arc<Notify>,
    fifo_index: usize,
}

pub enum WorkerBatch {
    Snapshots(Vec<SnapshotUpdate>),
    FifoItem {
        event_type: &'static str,
        event: Arc<EnrichedEvent>,
    },
}

pub struct SnapshotUpdate {
    pub event_type: &'static str,
    pub event: Arc<EnrichedEvent>,
}

impl WorkerInputs {
    pub fn new(latest: Vec<Latest1Input>, fifos: Vec<FifoInput>, notify_any: Arc<Notify>) -> Self {
        Self {
            latest,
            fifos,
            notify_any,
            fifo_index: 0,
        }
    }

    /// Returns whatever is ready without waiting. Snapshots come before FIFO
    /// items; FIFO inputs are polled round-robin.
    pub fn poll_ready(&mut self) -> Option<WorkerBatch> {
        let snaps: Vec<_> = self
            .latest
            .iter()
            .filter_map(|l| {
                l.queue.try_recv().map(|event| SnapshotUpdate {
                    event_type: l.event_type,
                    event,
                })
            })
            .collect();

        if !snaps.is_empty() {
            return Some(WorkerBatch::Snapshots(snaps));
        }

        for _ in 0..self.fifos.len() {
            let fifo = &self.fifos[self.fifo_index];
            self.fifo_index = (self.fifo_index + 1) % self.fifos.len();

            if let Some(event) = fifo.receiver.try_recv() {
                return Some(WorkerBatch::FifoItem {
                    event_type: fifo.event_type,
                    event,
                });
            }
        }

        None
    }

    pub async fn next(&mut self) -> WorkerBatch {
        loop {
            if let Some(batch) = self.poll_ready() {
                return batch;
            }
            self.notify_any.notified().await;
        }
    }
}
