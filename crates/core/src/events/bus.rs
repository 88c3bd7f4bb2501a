use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    events::{BusConfig, BusMetrics, EnrichedEvent, Event},
    routes::Routes,
};

/// Fans published events out to the inboxes of every subscriber of that type.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

struct EventBusInner {
    session_id: Uuid,
    next_ingest_seq: AtomicU64,
    routes: Routes,
    metrics: Arc<BusMetrics>,
    strict_routing: bool,
}

impl EventBus {
    pub fn new(cfg: BusConfig, routes: Routes, metrics: Arc<BusMetrics>) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                session_id: cfg.session_id,
                next_ingest_seq: AtomicU64::new(0),
                routes,
                metrics,
                strict_routing: cfg.strict_routing,
            }),
        }
    }

    /// A bus nobody listens to. Publishing is a no-op apart from metrics.
    pub fn without_subscribers() -> Self {
        Self::new(
            BusConfig::default(),
            Routes::default(),
            Arc::new(BusMetrics::new()),
        )
    }

    pub fn publish(&self, event: Arc<dyn Event>) {
        let ingest_seq = self.inner.next_ingest_seq.fetch_add(1, Ordering::Relaxed);
        let event_type = event.event_type();

        let Some(routes) = self.inner.routes.table.get(event_type) else {
            self.inner.metrics.record_unrouted(event_type);

            if self.inner.strict_routing {
                panic!("Unrouted event type: {event_type}");
            }
            return;
        };

        let enriched_event = Arc::new(EnrichedEvent {
            event,
            session_id: self.inner.session_id,
            ingest_seq,
            ingested_at: Instant::now(),
        });

        for route in routes {
            if route.inbox.deliver(Arc::clone(&enriched_event)) {
                route.drops_total.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "{} inbox full, dropped oldest {event_type}",
                    route.subscriber_id
                );
            }
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn metrics(&self) -> &BusMetrics {
        &self.inner.metrics
    }

    /// Total events dropped from `subscriber_id`'s inboxes so far.
    pub fn drops_for(&self, subscriber_id: &str) -> u64 {
        self.inner
            .routes
            .table
            .values()
            .flatten()
            .filter(|route| route.subscriber_id == subscriber_id)
            .map(|route| route.drops_total.load(Ordering::Relaxed))
            .sum()
    }
}
