use std::path::PathBuf;

use serde::Serialize;

use crate::{
    record::{ItemRecord, ItemStatus, Stage},
    rename::Renamer,
};

/// Read-only snapshot of a record for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemView {
    pub sequence_index: u32,
    pub file_name: String,
    pub source_path: PathBuf,
    pub status: &'static str,
    pub failed_stage: Option<Stage>,
    pub message: Option<String>,
    pub ocr_text: Option<String>,
    pub title: Option<String>,
    /// Final name once committed or planned, otherwise the name a commit would produce.
    pub new_name: Option<String>,
}

impl ItemView {
    pub fn of(record: &ItemRecord, renamer: &Renamer) -> Self {
        let (failed_stage, message) = match record.status() {
            ItemStatus::Failed { stage, message } => (Some(*stage), Some(message.clone())),
            _ => (None, None),
        };
        let new_name = match record.status() {
            ItemStatus::RenamePending => record.final_name().map(str::to_string),
            ItemStatus::Renamed => Some(record.file_name()),
            _ => renamer.proposed_name(record),
        };

        Self {
            sequence_index: record.sequence_index(),
            file_name: record.file_name(),
            source_path: record.source_path().to_path_buf(),
            status: record.status().label(),
            failed_stage,
            message,
            ocr_text: record.ocr_text().map(str::to_string),
            title: record.title().map(str::to_string),
            new_name,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed_stage.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_of_failed_record() {
        let mut record = ItemRecord::new(PathBuf::from("/v/a.mp4"), 1, 1);
        record.set_title("Hi").unwrap();
        record.mark_commit_failed("denied".into());

        let view = ItemView::of(&record, &Renamer::default());
        assert_eq!(view.status, "failed");
        assert_eq!(view.failed_stage, Some(Stage::Commit));
        assert_eq!(view.message.as_deref(), Some("denied"));
        assert_eq!(view.new_name.as_deref(), Some("1-Hi.mp4"));
    }

    #[test]
    fn test_view_of_pending_record_has_no_name() {
        let record = ItemRecord::new(PathBuf::from("/v/a.mp4"), 1, 1);
        let view = ItemView::of(&record, &Renamer::default());
        assert_eq!(view.new_name, None);
        assert!(!view.is_failed());
    }
}
