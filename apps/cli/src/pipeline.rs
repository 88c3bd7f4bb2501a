use anyhow::{Context, Result};
use tokio::{sync::broadcast, task::JoinHandle};
use videotitler_core::{
    events::{BusConfig, EventBus, EventBusBuilder},
    workers::Worker,
};

use crate::workers::{event_log_sink::EventLogSinkWorker, progress_sink::ProgressSinkWorker};

pub struct SinkHandle {
    pub bus: EventBus,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<Result<()>>>,
}

impl SinkHandle {
    /// Lets every sink drain what is already queued, then waits for it.
    pub async fn shutdown(self) {
        // no receivers left only if every sink already exited
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("sink ended with error: {e:#}"),
                Err(e) => log::error!("sink task panicked: {e}"),
            }
        }
    }
}

/// Builds the bus with the CLI's sinks subscribed and starts them.
pub fn start_sinks(bus_config: BusConfig, events_json: bool) -> Result<SinkHandle> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    let mut builder = EventBusBuilder::new(bus_config).subscribe(ProgressSinkWorker::subscription());
    if events_json {
        builder = builder.subscribe(EventLogSinkWorker::subscription());
    }
    let (bus, mut wiring) = builder.build().context("building event bus")?;
    log::debug!("event bus ready, session {}", bus.session_id());

    let mut tasks = Vec::new();
    let inputs = wiring
        .take(ProgressSinkWorker::SUBSCRIBER_ID)
        .context("progress sink has no inputs")?;
    tasks.push(tokio::spawn(
        ProgressSinkWorker::default().run(inputs, shutdown_rx.resubscribe()),
    ));

    if events_json {
        let inputs = wiring
            .take(EventLogSinkWorker::SUBSCRIBER_ID)
            .context("event log sink has no inputs")?;
        tasks.push(tokio::spawn(
            EventLogSinkWorker.run(inputs, shutdown_rx.resubscribe()),
        ));
    }

    Ok(SinkHandle {
        bus,
        shutdown_tx,
        tasks,
    })
}
