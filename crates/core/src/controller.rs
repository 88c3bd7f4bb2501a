//! Runs the pipeline on a background task so an interface stays responsive.
//!
//! Long operations are sent as [`ControlCommand`]s over a channel and run one
//! at a time. Edits and reads go straight to the shared [`Batch`] and are
//! allowed while a command runs; a stage result that raced with an edit is
//! discarded.

use std::sync::Arc;

use thiserror::Error;
use tokio::{
    sync::{RwLock, mpsc, watch},
    task::JoinHandle,
};

use crate::{
    batch::{Batch, BatchSummary},
    events::{EditKind, ItemEdited},
    pipeline::{BatchPipeline, PipelineOptions},
    record::{ItemRecord, ItemStatus, RecordError},
    view::ItemView,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    ProcessAll,
    ProcessOne(u32),
    Commit,
    RenameSingle(u32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("another batch operation is still running")]
    Busy,

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("controller has shut down")]
    Closed,
}

struct Shared {
    batch: Batch,
    pipeline: BatchPipeline,
    options: RwLock<PipelineOptions>,
    busy: watch::Sender<bool>,
}

pub struct BatchController {
    shared: Arc<Shared>,
    commands: mpsc::Sender<ControlCommand>,
    busy_rx: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl BatchController {
    /// Takes ownership of a scanned batch and starts the command task.
    pub fn spawn(
        pipeline: BatchPipeline,
        records: Vec<ItemRecord>,
        options: PipelineOptions,
    ) -> Self {
        let (busy, busy_rx) = watch::channel(false);
        let (commands, rx) = mpsc::channel(8);
        let shared = Arc::new(Shared {
            batch: Batch::new(records),
            pipeline,
            options: RwLock::new(options),
            busy,
        });

        let task = tokio::spawn(run_commands(Arc::clone(&shared), rx));

        Self {
            shared,
            commands,
            busy_rx,
            task,
        }
    }

    pub async fn start(&self) -> Result<(), ControllerError> {
        self.submit(ControlCommand::ProcessAll).await
    }

    /// Re-runs one item from its current (or failed) stage.
    pub async fn retry(&self, sequence_index: u32) -> Result<(), ControllerError> {
        let record = self.record(sequence_index).await?;
        if record.status() == &ItemStatus::Renamed {
            return Err(RecordError::AlreadyRenamed { sequence_index }.into());
        }
        self.submit(ControlCommand::ProcessOne(sequence_index)).await
    }

    pub async fn commit(&self) -> Result<(), ControllerError> {
        self.submit(ControlCommand::Commit).await
    }

    pub async fn rename_single(&self, sequence_index: u32) -> Result<(), ControllerError> {
        let record = self.record(sequence_index).await?;
        if record.status() == &ItemStatus::Renamed {
            return Err(RecordError::AlreadyRenamed { sequence_index }.into());
        }
        if !record.can_commit() {
            return Err(RecordError::NotReadyForCommit {
                sequence_index,
                status: record.status().to_string(),
            }
            .into());
        }
        self.submit(ControlCommand::RenameSingle(sequence_index))
            .await
    }

    /// Halts the running command after its current stage.
    pub fn stop(&self) {
        if self.is_busy() {
            self.shared.pipeline.stop();
        }
    }

    pub async fn set_ocr_text(
        &self,
        sequence_index: u32,
        text: &str,
    ) -> Result<ItemView, ControllerError> {
        let record = self.shared.batch.set_ocr_text(sequence_index, text).await?;
        Ok(self.edited(record, EditKind::OcrText))
    }

    pub async fn set_title(
        &self,
        sequence_index: u32,
        title: &str,
    ) -> Result<ItemView, ControllerError> {
        let record = self.shared.batch.set_title(sequence_index, title).await?;
        Ok(self.edited(record, EditKind::Title))
    }

    pub async fn reset(&self, sequence_index: u32) -> Result<ItemView, ControllerError> {
        let record = self.shared.batch.reset(sequence_index).await?;
        Ok(self.edited(record, EditKind::Reset))
    }

    fn edited(&self, record: ItemRecord, kind: EditKind) -> ItemView {
        log::debug!("item {} edited: {kind:?}", record.sequence_index());
        self.shared
            .pipeline
            .bus()
            .publish(Arc::new(ItemEdited::new(record.sequence_index(), kind)));
        ItemView::of(&record, self.shared.pipeline.renamer())
    }

    /// Applies to commands started after the change.
    pub async fn set_preview(&self, preview: bool) {
        self.shared.options.write().await.preview = preview;
    }

    pub async fn options(&self) -> PipelineOptions {
        self.shared.options.read().await.clone()
    }

    pub async fn snapshot(&self) -> Vec<ItemView> {
        self.shared
            .batch
            .views(self.shared.pipeline.renamer())
            .await
    }

    pub async fn item(&self, sequence_index: u32) -> Option<ItemView> {
        self.shared
            .batch
            .item(sequence_index)
            .await
            .map(|r| ItemView::of(&r, self.shared.pipeline.renamer()))
    }

    pub async fn summary(&self) -> BatchSummary {
        self.shared.batch.summary(false).await
    }

    pub fn is_busy(&self) -> bool {
        *self.busy_rx.borrow()
    }

    pub async fn wait_idle(&self) {
        let mut rx = self.busy_rx.clone();
        // only fails if the sender is gone, which also means idle
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    /// Waits for the running command, stops the task and hands back the records.
    pub async fn shutdown(self) -> Vec<ItemRecord> {
        let Self {
            shared,
            commands,
            task,
            ..
        } = self;
        drop(commands);
        if let Err(e) = task.await {
            log::error!("controller task ended abnormally: {e}");
        }

        match Arc::try_unwrap(shared) {
            Ok(shared) => shared.batch.into_records(),
            Err(shared) => shared.batch.records().await,
        }
    }

    async fn record(&self, sequence_index: u32) -> Result<ItemRecord, ControllerError> {
        self.shared
            .batch
            .item(sequence_index)
            .await
            .ok_or(ControllerError::Record(RecordError::UnknownItem {
                sequence_index,
            }))
    }

    async fn submit(&self, command: ControlCommand) -> Result<(), ControllerError> {
        let claimed = self.shared.busy.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        });
        if !claimed {
            return Err(ControllerError::Busy);
        }

        self.shared.pipeline.stop_signal().clear();
        if self.commands.send(command).await.is_err() {
            self.shared.busy.send_replace(false);
            return Err(ControllerError::Closed);
        }
        log::debug!("submitted {command:?}");
        Ok(())
    }
}

async fn run_commands(shared: Arc<Shared>, mut rx: mpsc::Receiver<ControlCommand>) {
    while let Some(command) = rx.recv().await {
        let options = shared.options.read().await.clone();
        let pipeline = &shared.pipeline;
        let batch = &shared.batch;

        match command {
            ControlCommand::ProcessAll => {
                pipeline.process_all(batch, &options).await;
            }
            ControlCommand::ProcessOne(seq) => {
                if let Err(e) = pipeline.process_one(batch, seq, &options).await {
                    log::warn!("retry of item {seq} rejected: {e}");
                }
            }
            ControlCommand::Commit => {
                pipeline.commit(batch).await;
            }
            ControlCommand::RenameSingle(seq) => {
                if let Err(e) = pipeline.rename_single(batch, seq).await {
                    log::warn!("rename of item {seq} rejected: {e}");
                }
            }
        }

        shared.busy.send_replace(false);
    }
}
