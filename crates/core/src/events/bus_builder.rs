use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::Result;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::{
    events::{ALL_EVENT_TYPES, EventBus},
    queues::{FifoDropOldestQueue, Latest1Queue, QueueKind},
    routes::{Route, RouteInbox, Routes},
    workers::{
        FifoInput, Latest1Input, SubscriptionSpec, WorkerInputs, WorkerWiring,
    },
};

pub struct BusConfig {
    pub session_id: Uuid,
    /// Panic on events nobody subscribed to. Meant for tests.
    pub strict_routing: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            strict_routing: false,
        }
    }
}

#[derive(Default)]
pub struct BusMetrics {
    pub unrouted_publish_total: AtomicU64,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_unrouted(&self, event_type: &'static str) {
        self.unrouted_publish_total.fetch_add(1, Ordering::Relaxed);
        log::trace!("no subscriber for {event_type}");
    }

    pub fn unrouted(&self) -> u64 {
        self.unrouted_publish_total.load(Ordering::Relaxed)
    }
}

fn validate(subs: &[SubscriptionSpec]) -> Result<()> {
    let mut seen_subscribers: HashSet<&'static str> = HashSet::new();
    for s in subs {
        if s.subscriber_id.trim().is_empty() {
            anyhow::bail!("empty subscriber_id");
        }
        if !seen_subscribers.insert(s.subscriber_id) {
            anyhow::bail!("duplicate subscriber_id={}", s.subscriber_id);
        }
        if s.inputs.is_empty() {
            anyhow::bail!("subscriber_id={} has no inputs", s.subscriber_id);
        }

        let mut seen_inputs: HashSet<&'static str> = HashSet::new();
        for i in &s.inputs {
            if !ALL_EVENT_TYPES.contains(&i.event_type) {
                anyhow::bail!(
                    "subscriber_id={} subscribes to unknown event_type={}",
                    s.subscriber_id,
                    i.event_type
                );
            }
            if !seen_inputs.insert(i.event_type) {
                anyhow::bail!(
                    "subscriber_id={} has duplicate input event_type={}",
                    s.subscriber_id,
                    i.event_type
                );
            }
            if let QueueKind::FifoDropOldest { capacity } = i.queue_kind {
                anyhow::ensure!(
                    capacity > 0,
                    "subscriber_id={} input {}: capacity must be > 0",
                    s.subscriber_id,
                    i.event_type
                );
            }
        }
    }
    Ok(())
}

pub struct EventBusBuilder {
    cfg: BusConfig,
    subs: Vec<SubscriptionSpec>,
}

impl EventBusBuilder {
    pub fn new(cfg: BusConfig) -> Self {
        Self {
            cfg,
            subs: Vec::new(),
        }
    }

    pub fn subscribe(mut self, s: SubscriptionSpec) -> Self {
        self.subs.push(s);
        self
    }

    pub fn build(self) -> Result<(EventBus, WorkerWiring)> {
        validate(&self.subs)?;

        let mut routes = Routes::default();
        let mut wiring: HashMap<&'static str, WorkerInputs> = HashMap::new();
        let metrics = Arc::new(BusMetrics::new());

        for spec in self.subs {
            let notify_any = Arc::new(Notify::new());
            let mut latest = Vec::new();
            let mut fifos = Vec::new();

            for input in spec.inputs {
                let drops_total = Arc::new(AtomicU64::new(0));

                let inbox = match input.queue_kind {
                    QueueKind::Latest1 => {
                        let q = Arc::new(Latest1Queue::new(Arc::clone(&notify_any)));
                        latest.push(Latest1Input {
                            event_type: input.event_type,
                            queue: Arc::clone(&q),
                        });
                        RouteInbox::Latest1(q)
                    }
                    QueueKind::FifoDropOldest { capacity } => {
                        let q =
                            Arc::new(FifoDropOldestQueue::new(capacity, Arc::clone(&notify_any)));
                        fifos.push(FifoInput {
                            event_type: input.event_type,
                            receiver: q.receiver(),
                        });
                        RouteInbox::FifoDropOldest(q)
                    }
                };

                routes
                    .table
                    .entry(input.event_type)
                    .or_default()
                    .push(Route {
                        subscriber_id: spec.subscriber_id,
                        inbox,
                        drops_total,
                    });
            }

            wiring.insert(
                spec.subscriber_id,
                WorkerInputs::new(latest, fifos, notify_any),
            );
        }

        let bus = EventBus::new(self.cfg, routes, metrics);
        Ok((bus, WorkerWiring::new(wiring)))
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::Arc};

    use super::*;
    use crate::{
        events::{BatchScanned, ItemEdited, EditKind},
        workers::{InputSpec, WorkerBatch},
    };

    fn spec(id: &'static str, event_type: &'static str, queue_kind: QueueKind) -> SubscriptionSpec {
        SubscriptionSpec {
            subscriber_id: id,
            inputs: vec![InputSpec {
                event_type,
                queue_kind,
            }],
        }
    }

    #[test]
    fn test_rejects_duplicate_subscribers() {
        let result = EventBusBuilder::new(BusConfig::default())
            .subscribe(spec("a", BatchScanned::EVENT_TYPE, QueueKind::Latest1))
            .subscribe(spec("a", ItemEdited::EVENT_TYPE, QueueKind::Latest1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_unknown_event_type() {
        let result = EventBusBuilder::new(BusConfig::default())
            .subscribe(spec("a", "made.up", QueueKind::Latest1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let result = EventBusBuilder::new(BusConfig::default())
            .subscribe(spec(
                "a",
                BatchScanned::EVENT_TYPE,
                QueueKind::FifoDropOldest { capacity: 0 },
            ))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_routes_only_subscribed_types() {
        let (bus, mut wiring) = EventBusBuilder::new(BusConfig::default())
            .subscribe(spec(
                "sink",
                ItemEdited::EVENT_TYPE,
                QueueKind::FifoDropOldest { capacity: 1 },
            ))
            .build()
            .unwrap();
        let mut inputs = wiring.take("sink").unwrap();

        bus.publish(Arc::new(BatchScanned::new(PathBuf::from("/v"), 0)));
        bus.publish(Arc::new(ItemEdited::new(1, EditKind::Title)));
        bus.publish(Arc::new(ItemEdited::new(2, EditKind::Reset)));

        assert_eq!(bus.metrics().unrouted(), 1);
        assert_eq!(bus.drops_for("sink"), 1);
        match inputs.next().await {
            WorkerBatch::FifoItem { event, .. } => {
                assert_eq!(event.event.sequence_index(), Some(2));
                assert_eq!(event.session_id, bus.session_id());
            }
            WorkerBatch::Snapshots(_) => panic!("expected a fifo item"),
        }
    }
}
