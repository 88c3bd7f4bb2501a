use std::{
    io::{self, Write},
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use videotitler_core::{
    events::{ALL_EVENT_TYPES, EnrichedEvent},
    queues::QueueKind,
    workers::{InputSpec, SubscriptionSpec, Worker},
};

/// Writes every event as one JSON object per line to stderr.
pub struct EventLogSinkWorker;

pub fn event_line(event: &EnrichedEvent) -> Result<String> {
    let line = json!({
        "session_id": event.session_id.to_string(),
        "seq": event.ingest_seq,
        "event_type": event.event.event_type(),
        "sequence_index": event.event.sequence_index(),
        "event": serde_json::to_value(&*event.event)?,
    });
    Ok(line.to_string())
}

#[async_trait]
impl Worker for EventLogSinkWorker {
    const SUBSCRIBER_ID: &'static str = "cli.event_log_sink";

    fn subscription() -> SubscriptionSpec {
        SubscriptionSpec {
            subscriber_id: Self::SUBSCRIBER_ID,
            inputs: ALL_EVENT_TYPES
                .iter()
                .map(|&event_type| InputSpec {
                    event_type,
                    queue_kind: QueueKind::FifoDropOldest { capacity: 1024 },
                })
                .collect(),
        }
    }

    async fn handle(&mut self, event: Arc<EnrichedEvent>) -> Result<()> {
        let line = event_line(&event)?;
        writeln!(io::stderr().lock(), "{line}")?;
        Ok(())
    }
}
