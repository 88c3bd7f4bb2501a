//! Per-video state threaded through the pipeline.
//!
//! An [`ItemRecord`] moves along
//! `Pending -> FrameExtracted -> OcrDone -> TitleDone -> RenamePending -> Renamed`,
//! or lands in `Failed { stage, message }` from any automated stage. Manual
//! edits may jump forward; nothing but an explicit retry, edit or reset
//! leaves `Failed`.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::frame::FrameImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Ocr,
    Title,
    Commit,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Ocr => "ocr",
            Stage::Title => "title",
            Stage::Commit => "commit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    FrameExtracted,
    OcrDone,
    TitleDone,
    RenamePending,
    Renamed,
    Failed { stage: Stage, message: String },
}

impl ItemStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::FrameExtracted => "frame extracted",
            ItemStatus::OcrDone => "ocr done",
            ItemStatus::TitleDone => "title done",
            ItemStatus::RenamePending => "rename pending",
            ItemStatus::Renamed => "renamed",
            ItemStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ItemStatus::Failed { .. })
    }

    pub fn is_failed_at(&self, at: Stage) -> bool {
        matches!(self, ItemStatus::Failed { stage, .. } if *stage == at)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Failed { stage, message } => write!(f, "failed at {stage}: {message}"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("item {sequence_index} is already renamed; rescan the directory to process it again")]
    AlreadyRenamed { sequence_index: u32 },

    #[error("item {sequence_index} has no title to commit (status: {status})")]
    NotReadyForCommit { sequence_index: u32, status: String },

    #[error("no item with sequence index {sequence_index}")]
    UnknownItem { sequence_index: u32 },

    #[error("title must not be empty")]
    EmptyTitle,
}

/// Artifact produced by a successful automated stage.
#[derive(Debug, Clone)]
pub enum StageArtifact {
    Frame(Arc<FrameImage>),
    OcrText(String),
    Title(String),
}

/// Result of one collaborator call, ready to be applied to the record it was computed for.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: Stage,
    pub frame_index: Option<u32>,
    pub result: std::result::Result<StageArtifact, String>,
    pub started_event: Uuid,
}

impl StageOutcome {
    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }
}

#[derive(Debug, Clone)]
pub struct ItemRecord {
    source_path: PathBuf,
    sequence_index: u32,
    frame_index: u32,
    extracted_image: Option<Arc<FrameImage>>,
    ocr_text: Option<String>,
    title: Option<String>,
    status: ItemStatus,
    final_name: Option<String>,
    revision: u64,
}

impl ItemRecord {
    pub fn new(source_path: PathBuf, sequence_index: u32, frame_index: u32) -> Self {
        Self {
            source_path,
            sequence_index,
            frame_index,
            extracted_image: None,
            ocr_text: None,
            title: None,
            status: ItemStatus::Pending,
            final_name: None,
            revision: 0,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn sequence_index(&self) -> u32 {
        self.sequence_index
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn extracted_image(&self) -> Option<&FrameImage> {
        self.extracted_image.as_deref()
    }

    pub fn ocr_text(&self) -> Option<&str> {
        self.ocr_text.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn status(&self) -> &ItemStatus {
        &self.status
    }

    pub fn final_name(&self) -> Option<&str> {
        self.final_name.as_deref()
    }

    /// Bumped on every mutation; a stage result computed against an older
    /// revision must not be applied.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Still has automated stages ahead and is neither failed nor finalized.
    pub fn is_runnable(&self) -> bool {
        matches!(
            self.status,
            ItemStatus::Pending | ItemStatus::FrameExtracted | ItemStatus::OcrDone
        )
    }

    /// Eligible for a batch commit.
    pub fn is_committable(&self) -> bool {
        self.title.is_some()
            && matches!(
                self.status,
                ItemStatus::TitleDone | ItemStatus::RenamePending
            )
    }

    /// Eligible for a targeted commit, which also retries a failed rename.
    pub fn can_commit(&self) -> bool {
        self.is_committable() || (self.title.is_some() && self.status.is_failed_at(Stage::Commit))
    }

    /// The stage a drive or retry would run next. A failed record resumes at
    /// the stage that failed unless the artifact that stage consumes is gone.
    pub fn next_stage(&self) -> Option<Stage> {
        let wanted = match &self.status {
            ItemStatus::Pending => Stage::Extract,
            ItemStatus::FrameExtracted => Stage::Ocr,
            ItemStatus::OcrDone => Stage::Title,
            ItemStatus::TitleDone | ItemStatus::RenamePending => Stage::Commit,
            ItemStatus::Renamed => return None,
            ItemStatus::Failed { stage, .. } => *stage,
        };
        Some(self.rebuildable_from(wanted))
    }

    fn rebuildable_from(&self, stage: Stage) -> Stage {
        match stage {
            Stage::Ocr if self.extracted_image.is_none() => Stage::Extract,
            Stage::Title if self.ocr_text.is_none() => self.rebuildable_from(Stage::Ocr),
            Stage::Commit if self.title.is_none() => self.rebuildable_from(Stage::Title),
            other => other,
        }
    }

    pub(crate) fn apply(&mut self, outcome: StageOutcome) {
        if let Some(frame_index) = outcome.frame_index {
            self.frame_index = frame_index;
        }

        match outcome.result {
            Ok(StageArtifact::Frame(image)) => {
                self.extracted_image = Some(image);
                self.status = ItemStatus::FrameExtracted;
            }
            Ok(StageArtifact::OcrText(text)) => {
                self.ocr_text = Some(text);
                self.extracted_image = None;
                self.status = ItemStatus::OcrDone;
            }
            Ok(StageArtifact::Title(title)) => {
                self.title = Some(title);
                self.final_name = None;
                self.status = ItemStatus::TitleDone;
            }
            Err(message) => {
                self.status = ItemStatus::Failed {
                    stage: outcome.stage,
                    message,
                };
            }
        }
        self.revision += 1;
    }

    pub(crate) fn mark_rename_pending(&mut self, final_name: String) {
        self.final_name = Some(final_name);
        self.status = ItemStatus::RenamePending;
        self.revision += 1;
    }

    pub(crate) fn mark_renamed(&mut self, new_path: PathBuf) {
        self.final_name = new_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        self.source_path = new_path;
        self.status = ItemStatus::Renamed;
        self.revision += 1;
    }

    pub(crate) fn mark_commit_failed(&mut self, message: String) {
        self.final_name = None;
        self.status = ItemStatus::Failed {
            stage: Stage::Commit,
            message,
        };
        self.revision += 1;
    }

    /// Replaces the recognized text. Any existing title was derived from the
    /// old text, so it is dropped and the record waits for a new title.
    pub fn set_ocr_text(&mut self, text: &str) -> Result<(), RecordError> {
        self.ensure_editable()?;
        self.ocr_text = Some(text.trim().to_string());
        self.extracted_image = None;
        self.title = None;
        self.final_name = None;
        self.status = ItemStatus::OcrDone;
        self.revision += 1;
        Ok(())
    }

    /// Sets the title by hand, making the record committable whatever
    /// happened to it before.
    pub fn set_title(&mut self, title: &str) -> Result<(), RecordError> {
        self.ensure_editable()?;
        let title = title.trim();
        if title.is_empty() {
            return Err(RecordError::EmptyTitle);
        }
        self.title = Some(title.to_string());
        self.final_name = None;
        self.status = ItemStatus::TitleDone;
        self.revision += 1;
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), RecordError> {
        self.ensure_editable()?;
        self.extracted_image = None;
        self.ocr_text = None;
        self.title = None;
        self.final_name = None;
        self.status = ItemStatus::Pending;
        self.revision += 1;
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), RecordError> {
        if self.status == ItemStatus::Renamed {
            return Err(RecordError::AlreadyRenamed {
                sequence_index: self.sequence_index,
            });
        }
        Ok(())
    }
}
