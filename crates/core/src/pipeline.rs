//! Drives records through extraction, OCR and title generation, and hands
//! titled records to the [`Renamer`].

use std::{
    collections::HashSet,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    batch::{Batch, BatchSummary},
    error::Result,
    events::{
        BatchFinished, BatchScanned, BatchStarted, Event, EventBus, ItemFailed, ItemRenamed,
        StageCompleted, StageStarted,
    },
    frame::FrameExtractor,
    ocr::{OcrMode, TextRecognizer},
    record::{ItemRecord, ItemStatus, RecordError, Stage, StageArtifact, StageOutcome},
    rename::{CommitReport, Renamer},
    scan::{self, ScanOptions},
    title::{PromptTemplate, TitleGenerator},
};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Titles are generated but nothing is renamed.
    pub preview: bool,
    pub ocr_mode: OcrMode,
    pub prompt: PromptTemplate,
    /// 1-based frame to read text from.
    pub frame_index: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            preview: false,
            ocr_mode: OcrMode::default(),
            prompt: PromptTemplate::default(),
            frame_index: 1,
        }
    }
}

/// Cooperative stop flag, checked before every stage.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn FrameExtractor>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub generator: Arc<dyn TitleGenerator>,
}

enum Drive {
    /// Reached `TitleDone` or had nothing left to run.
    Finished,
    Failed,
    /// A concurrent edit replaced the record mid-stage.
    Superseded,
    Stopped,
}

pub struct BatchPipeline {
    collaborators: Collaborators,
    renamer: Renamer,
    bus: EventBus,
    stop: StopSignal,
}

impl BatchPipeline {
    pub fn new(collaborators: Collaborators, renamer: Renamer) -> Self {
        Self {
            collaborators,
            renamer,
            bus: EventBus::without_subscribers(),
            stop: StopSignal::default(),
        }
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn renamer(&self) -> &Renamer {
        &self.renamer
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Asks a running `process_all`/`process_one` to halt after its current stage.
    pub fn stop(&self) {
        self.stop.request();
    }

    pub fn scan(&self, dir: &Path, frame_index: u32) -> Result<Vec<ItemRecord>> {
        self.scan_with(
            dir,
            &ScanOptions {
                frame_index,
                ..ScanOptions::default()
            },
        )
    }

    pub fn scan_with(&self, dir: &Path, options: &ScanOptions) -> Result<Vec<ItemRecord>> {
        let records = scan::scan_directory(dir, options)?;
        self.bus
            .publish(Arc::new(BatchScanned::new(dir.to_path_buf(), records.len())));
        Ok(records)
    }

    /// Runs every runnable record to `TitleDone` in sequence order. Failed,
    /// titled and renamed records are left alone. Without preview, records
    /// titled during this call are renamed at the end, also after a stop.
    pub async fn process_all(&self, batch: &Batch, options: &PipelineOptions) -> BatchSummary {
        let total = batch.len().await;
        let runnable = batch
            .records()
            .await
            .iter()
            .filter(|r| r.is_runnable())
            .count();
        log::info!(
            "processing {runnable} of {total} items (preview: {})",
            options.preview
        );
        self.bus
            .publish(Arc::new(BatchStarted::new(runnable, options.preview)));

        let mut finished = HashSet::new();
        let mut stopped = false;

        for idx in 0..total {
            let Some(record) = batch.snapshot_at(idx).await else {
                break;
            };
            if !record.is_runnable() {
                continue;
            }

            match self.drive(batch, idx, options).await {
                Drive::Finished => {
                    finished.insert(record.sequence_index());
                }
                Drive::Stopped => {
                    stopped = true;
                    break;
                }
                Drive::Failed | Drive::Superseded => {}
            }
        }

        if stopped {
            log::info!("stop requested, halting batch");
            self.stop.clear();
        }

        if !options.preview && !finished.is_empty() {
            self.commit_matching(batch, |r| {
                finished.contains(&r.sequence_index()) && r.is_committable()
            })
            .await;
        }

        let summary = batch.summary(stopped).await;
        log::info!(
            "batch done: {} titled, {} renamed, {} failed, {} pending",
            summary.title_done,
            summary.renamed,
            summary.failed,
            summary.pending
        );
        self.bus.publish(Arc::new(BatchFinished::new(summary)));
        summary
    }

    /// Re-runs one record from its current stage; a failed record resumes at
    /// the stage that failed. Without preview a titled record is renamed.
    pub async fn process_one(
        &self,
        batch: &Batch,
        sequence_index: u32,
        options: &PipelineOptions,
    ) -> std::result::Result<ItemStatus, RecordError> {
        let idx = batch.position(sequence_index).await?;
        let record = batch
            .snapshot_at(idx)
            .await
            .ok_or(RecordError::UnknownItem { sequence_index })?;
        if record.status() == &ItemStatus::Renamed {
            return Err(RecordError::AlreadyRenamed { sequence_index });
        }

        log::info!("re-running item {sequence_index} from {}", record.status());
        if let Drive::Stopped = self.drive(batch, idx, options).await {
            self.stop.clear();
        }

        if !options.preview {
            self.commit_matching(batch, |r| {
                r.sequence_index() == sequence_index && r.can_commit()
            })
            .await;
        }

        batch
            .item(sequence_index)
            .await
            .map(|r| r.status().clone())
            .ok_or(RecordError::UnknownItem { sequence_index })
    }

    /// Renames every record at `TitleDone` or `RenamePending`.
    pub async fn commit(&self, batch: &Batch) -> Vec<CommitReport> {
        self.commit_matching(batch, ItemRecord::is_committable).await
    }

    /// Renames one titled record, still avoiding names taken by the rest of
    /// the batch or already on disk.
    pub async fn rename_single(
        &self,
        batch: &Batch,
        sequence_index: u32,
    ) -> std::result::Result<CommitReport, RecordError> {
        let record = batch
            .item(sequence_index)
            .await
            .ok_or(RecordError::UnknownItem { sequence_index })?;
        if record.status() == &ItemStatus::Renamed {
            return Err(RecordError::AlreadyRenamed { sequence_index });
        }
        if !record.can_commit() {
            return Err(RecordError::NotReadyForCommit {
                sequence_index,
                status: record.status().to_string(),
            });
        }

        self.commit_matching(batch, |r| r.sequence_index() == sequence_index)
            .await
            .into_iter()
            .next()
            .ok_or(RecordError::NotReadyForCommit {
                sequence_index,
                status: record.status().to_string(),
            })
    }

    async fn commit_matching<F>(&self, batch: &Batch, select: F) -> Vec<CommitReport>
    where
        F: Fn(&ItemRecord) -> bool,
    {
        let plan = batch.plan_renames(&self.renamer, select).await;
        let mut reports = Vec::with_capacity(plan.steps().len());

        for step in plan.steps() {
            let outcome = plan.rename(step).await;
            batch.finish_rename(step, &outcome).await;

            match &outcome {
                Ok(to) => self.bus.publish(Arc::new(ItemRenamed::new(
                    step.sequence_index,
                    step.from.clone(),
                    to.clone(),
                ))),
                Err(message) => self.bus.publish(Arc::new(ItemFailed::new(
                    Vec::new(),
                    step.sequence_index,
                    Stage::Commit,
                    message.clone(),
                ))),
            }
            reports.push(step.report(outcome));
        }
        reports
    }

    async fn drive(&self, batch: &Batch, idx: usize, options: &PipelineOptions) -> Drive {
        loop {
            if self.stop.is_requested() {
                return Drive::Stopped;
            }

            let Some(record) = batch.snapshot_at(idx).await else {
                return Drive::Finished;
            };
            let stage = match record.next_stage() {
                None | Some(Stage::Commit) => return Drive::Finished,
                Some(stage) => stage,
            };

            let outcome = self.run_stage(&record, stage, options).await;
            let failed = outcome.is_failure();
            let event = self.outcome_event(&record, &outcome);

            if !batch
                .apply_if_unchanged(idx, record.revision(), outcome)
                .await
            {
                return Drive::Superseded;
            }
            self.bus.publish(event);

            if failed {
                return Drive::Failed;
            }
        }
    }

    async fn run_stage(
        &self,
        record: &ItemRecord,
        stage: Stage,
        options: &PipelineOptions,
    ) -> StageOutcome {
        let started = StageStarted::new(record.sequence_index(), stage);
        let started_event = started.header.event_id;
        self.bus.publish(Arc::new(started));
        log::debug!("item {}: {stage} started", record.sequence_index());

        let (frame_index, result) = match stage {
            Stage::Extract => (Some(options.frame_index), self.extract(record, options).await),
            Stage::Ocr => (None, self.recognize(record, options).await),
            Stage::Title => (None, self.generate(record, options).await),
            Stage::Commit => (None, Err("commit is not an automated stage".to_string())),
        };

        if let Err(message) = &result {
            log::warn!(
                "item {} ({}) failed at {stage}: {message}",
                record.sequence_index(),
                record.file_name()
            );
        }

        StageOutcome {
            stage,
            frame_index,
            result,
            started_event,
        }
    }

    async fn extract(
        &self,
        record: &ItemRecord,
        options: &PipelineOptions,
    ) -> std::result::Result<StageArtifact, String> {
        let extracted = self
            .collaborators
            .extractor
            .extract(record.source_path(), options.frame_index)
            .await
            .map_err(|e| e.to_string())?;

        if extracted.used_last_frame {
            log::info!(
                "item {}: frame {} is past the end, used the last frame",
                record.sequence_index(),
                options.frame_index
            );
        }
        Ok(StageArtifact::Frame(Arc::new(extracted.image)))
    }

    async fn recognize(
        &self,
        record: &ItemRecord,
        options: &PipelineOptions,
    ) -> std::result::Result<StageArtifact, String> {
        let image = record
            .extracted_image()
            .ok_or_else(|| "no extracted frame to read".to_string())?;

        self.collaborators
            .recognizer
            .recognize(image, options.ocr_mode)
            .await
            .map(StageArtifact::OcrText)
            .map_err(|e| e.to_string())
    }

    async fn generate(
        &self,
        record: &ItemRecord,
        options: &PipelineOptions,
    ) -> std::result::Result<StageArtifact, String> {
        let text = record.ocr_text().unwrap_or_default();

        self.collaborators
            .generator
            .generate(text, &options.prompt)
            .await
            .map(StageArtifact::Title)
            .map_err(|e| e.to_string())
    }

    fn outcome_event(
        &self,
        record: &ItemRecord,
        outcome: &StageOutcome,
    ) -> Arc<dyn Event> {
        let seq = record.sequence_index();
        match &outcome.result {
            Ok(artifact) => {
                let output = match artifact {
                    StageArtifact::Frame(_) => None,
                    StageArtifact::OcrText(text) => Some(text.clone()),
                    StageArtifact::Title(title) => Some(title.clone()),
                };
                Arc::new(StageCompleted::new(
                    outcome.started_event,
                    seq,
                    outcome.stage,
                    output,
                ))
            }
            Err(message) => Arc::new(ItemFailed::new(
                vec![outcome.started_event],
                seq,
                outcome.stage,
                message.clone(),
            )),
        }
    }
}
