mod common;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use common::{Fakes, file_names, video_dir};
use tokio::sync::broadcast;
use videotitler_core::{
    BatchController, ControllerError, ItemStatus, PipelineOptions, RecordError,
    events::{
        BatchFinished, BusConfig, EnrichedEvent, EventBusBuilder, ItemEdited, ItemRenamed,
    },
    queues::QueueKind,
    workers::{InputSpec, SubscriptionSpec, Worker},
};

fn preview() -> PipelineOptions {
    PipelineOptions {
        preview: true,
        ..PipelineOptions::default()
    }
}

#[tokio::test]
async fn test_start_runs_batch_in_background() {
    let dir = video_dir(&["a.mp4", "b.mp4"]);
    let fakes = Fakes::new();
    let pipeline = fakes.pipeline();
    let records = pipeline.scan(dir.path(), 1).unwrap();
    let controller = BatchController::spawn(pipeline, records, preview());

    controller.start().await.unwrap();
    assert!(controller.is_busy());
    controller.wait_idle().await;

    let views = controller.snapshot().await;
    assert_eq!(views.len(), 2);
    assert!(views.iter().all(|v| v.status == "title done"));
    assert_eq!(views[1].new_name.as_deref(), Some("2-Clip b.mp4"));
    assert_eq!(controller.summary().await.title_done, 2);
}

#[tokio::test]
async fn test_second_command_is_rejected_while_busy() {
    let dir = video_dir(&["a.mp4"]);
    let fakes = Fakes::new();
    let gate = fakes.generator.gated();
    let pipeline = fakes.pipeline();
    let records = pipeline.scan(dir.path(), 1).unwrap();
    let controller = BatchController::spawn(pipeline, records, preview());

    controller.start().await.unwrap();
    gate.entered.notified().await;

    assert_eq!(controller.start().await, Err(ControllerError::Busy));
    assert_eq!(controller.retry(1).await, Err(ControllerError::Busy));
    assert_eq!(controller.commit().await, Err(ControllerError::Busy));

    let view = controller.set_title(1, "Typed while busy").await.unwrap();
    assert_eq!(view.title.as_deref(), Some("Typed while busy"));

    gate.release.notify_one();
    controller.wait_idle().await;

    let item = controller.item(1).await.unwrap();
    assert_eq!(item.title.as_deref(), Some("Typed while busy"));
    assert!(!controller.is_busy());
    controller.start().await.unwrap();
    controller.wait_idle().await;
}

#[tokio::test]
async fn test_stop_leaves_remaining_items_pending() {
    let dir = video_dir(&["a.mp4", "b.mp4"]);
    let fakes = Fakes::new();
    let gate = fakes.generator.gated();
    let pipeline = fakes.pipeline();
    let records = pipeline.scan(dir.path(), 1).unwrap();
    let controller = BatchController::spawn(pipeline, records, preview());

    controller.start().await.unwrap();
    gate.entered.notified().await;
    controller.stop();
    gate.release.notify_one();
    controller.wait_idle().await;

    let views = controller.snapshot().await;
    assert_eq!(views[0].status, "title done");
    assert_eq!(views[1].status, "pending");
    assert_eq!(fakes.extractor.calls(), 1);
}

#[tokio::test]
async fn test_stop_when_idle_does_not_block_next_run() {
    let dir = video_dir(&["a.mp4"]);
    let fakes = Fakes::new();
    let pipeline = fakes.pipeline();
    let records = pipeline.scan(dir.path(), 1).unwrap();
    let controller = BatchController::spawn(pipeline, records, preview());

    controller.stop();
    controller.start().await.unwrap();
    controller.wait_idle().await;

    assert_eq!(controller.summary().await.title_done, 1);
}

#[tokio::test]
async fn test_item_commands_validate_before_queueing() {
    let dir = video_dir(&["a.mp4"]);
    let fakes = Fakes::new();
    let pipeline = fakes.pipeline();
    let records = pipeline.scan(dir.path(), 1).unwrap();
    let controller = BatchController::spawn(pipeline, records, preview());

    assert_eq!(
        controller.retry(9).await,
        Err(ControllerError::Record(RecordError::UnknownItem {
            sequence_index: 9
        }))
    );
    assert!(matches!(
        controller.rename_single(1).await,
        Err(ControllerError::Record(RecordError::NotReadyForCommit {
            sequence_index: 1,
            ..
        }))
    ));
    assert_eq!(
        controller.set_title(1, "   ").await,
        Err(ControllerError::Record(RecordError::EmptyTitle))
    );
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn test_rename_single_and_shutdown() {
    let dir = video_dir(&["a.mp4", "b.mp4"]);
    let fakes = Fakes::new();
    let pipeline = fakes.pipeline();
    let records = pipeline.scan(dir.path(), 1).unwrap();
    let controller = BatchController::spawn(pipeline, records, preview());

    controller.start().await.unwrap();
    controller.wait_idle().await;
    controller.rename_single(2).await.unwrap();
    controller.wait_idle().await;

    assert_eq!(file_names(dir.path()), vec!["2-Clip b.mp4", "a.mp4"]);
    assert_eq!(
        controller.rename_single(2).await,
        Err(ControllerError::Record(RecordError::AlreadyRenamed {
            sequence_index: 2
        }))
    );

    let records = controller.shutdown().await;
    assert_eq!(records[0].status(), &ItemStatus::TitleDone);
    assert_eq!(records[1].status(), &ItemStatus::Renamed);
}

#[tokio::test]
async fn test_preview_toggle_applies_to_next_command() {
    let dir = video_dir(&["a.mp4"]);
    let fakes = Fakes::new();
    let pipeline = fakes.pipeline();
    let records = pipeline.scan(dir.path(), 1).unwrap();
    let controller = BatchController::spawn(pipeline, records, preview());

    controller.start().await.unwrap();
    controller.wait_idle().await;
    assert_eq!(file_names(dir.path()), vec!["a.mp4"]);

    controller.set_preview(false).await;
    assert!(!controller.options().await.preview);
    controller.commit().await.unwrap();
    controller.wait_idle().await;

    assert_eq!(file_names(dir.path()), vec!["1-Clip a.mp4"]);
    assert_eq!(controller.item(1).await.unwrap().status, "renamed");
}

struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Worker for Recorder {
    const SUBSCRIBER_ID: &'static str = "test_recorder";

    fn subscription() -> SubscriptionSpec {
        let fifo = |event_type| InputSpec {
            event_type,
            queue_kind: QueueKind::FifoDropOldest { capacity: 64 },
        };
        SubscriptionSpec {
            subscriber_id: Self::SUBSCRIBER_ID,
            inputs: vec![
                fifo(ItemEdited::EVENT_TYPE),
                fifo(ItemRenamed::EVENT_TYPE),
                fifo(BatchFinished::EVENT_TYPE),
            ],
        }
    }

    async fn handle(&mut self, event: Arc<EnrichedEvent>) -> Result<()> {
        let label = match event.event.sequence_index() {
            Some(seq) => format!("{}#{seq}", event.event.event_type()),
            None => event.event.event_type().to_string(),
        };
        self.seen.lock().unwrap().push(label);
        Ok(())
    }
}

#[tokio::test]
async fn test_subscribed_worker_sees_edits_and_renames() {
    let dir = video_dir(&["a.mp4"]);
    let fakes = Fakes::new();
    let (bus, mut wiring) = EventBusBuilder::new(BusConfig::default())
        .subscribe(Recorder::subscription())
        .build()
        .unwrap();
    let inputs = wiring.take(Recorder::SUBSCRIBER_ID).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (shutdown, shutdown_rx) = broadcast::channel(1);
    let worker = tokio::spawn(
        Recorder {
            seen: Arc::clone(&seen),
        }
        .run(inputs, shutdown_rx),
    );

    let pipeline = fakes.pipeline().with_bus(bus.clone());
    let records = pipeline.scan(dir.path(), 1).unwrap();
    let controller = BatchController::spawn(pipeline, records, PipelineOptions::default());

    controller.set_title(1, "Named first").await.unwrap();
    controller.start().await.unwrap();
    controller.wait_idle().await;
    controller.commit().await.unwrap();
    controller.wait_idle().await;

    shutdown.send(()).unwrap();
    worker.await.unwrap().unwrap();

    let seen = seen.lock().unwrap().clone();
    assert!(seen.iter().any(|s| s == "item.edited#1"));
    assert!(seen.iter().any(|s| s == "batch.finished"));
    assert!(seen.iter().any(|s| s == "item.renamed#1"));
    assert_eq!(bus.drops_for(Recorder::SUBSCRIBER_ID), 0);
    assert_eq!(file_names(dir.path()), vec!["1-Named first.mp4"]);
}
