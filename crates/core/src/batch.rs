use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::{
    record::{ItemRecord, ItemStatus, RecordError, StageOutcome},
    rename::{self, PlannedRename, RenamePlan, Renamer},
    view::ItemView,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Not yet titled and not failed.
    pub pending: usize,
    pub title_done: usize,
    pub renamed: usize,
    pub failed: usize,
    pub stopped: bool,
}

/// The records of one scan, shared between the pipeline and edit calls.
///
/// Stage results are computed on a cloned record outside the lock and only
/// written back if the record has not been touched in the meantime.
#[derive(Debug, Default)]
pub struct Batch {
    records: RwLock<Vec<ItemRecord>>,
}

impl Batch {
    pub fn new(mut records: Vec<ItemRecord>) -> Self {
        records.sort_by_key(ItemRecord::sequence_index);
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn records(&self) -> Vec<ItemRecord> {
        self.records.read().await.clone()
    }

    pub fn into_records(self) -> Vec<ItemRecord> {
        self.records.into_inner()
    }

    pub async fn views(&self, renamer: &Renamer) -> Vec<ItemView> {
        self.records
            .read()
            .await
            .iter()
            .map(|r| ItemView::of(r, renamer))
            .collect()
    }

    pub async fn item(&self, sequence_index: u32) -> Option<ItemRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.sequence_index() == sequence_index)
            .cloned()
    }

    pub async fn set_ocr_text(&self, sequence_index: u32, text: &str) -> Result<ItemRecord, RecordError> {
        self.edit(sequence_index, |r| r.set_ocr_text(text)).await
    }

    pub async fn set_title(&self, sequence_index: u32, title: &str) -> Result<ItemRecord, RecordError> {
        self.edit(sequence_index, |r| r.set_title(title)).await
    }

    pub async fn reset(&self, sequence_index: u32) -> Result<ItemRecord, RecordError> {
        self.edit(sequence_index, ItemRecord::reset).await
    }

    async fn edit<F>(&self, sequence_index: u32, f: F) -> Result<ItemRecord, RecordError>
    where
        F: FnOnce(&mut ItemRecord) -> Result<(), RecordError>,
    {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.sequence_index() == sequence_index)
            .ok_or(RecordError::UnknownItem { sequence_index })?;
        f(record)?;
        Ok(record.clone())
    }

    pub(crate) async fn position(&self, sequence_index: u32) -> Result<usize, RecordError> {
        self.records
            .read()
            .await
            .iter()
            .position(|r| r.sequence_index() == sequence_index)
            .ok_or(RecordError::UnknownItem { sequence_index })
    }

    pub(crate) async fn snapshot_at(&self, idx: usize) -> Option<ItemRecord> {
        self.records.read().await.get(idx).cloned()
    }

    /// Applies `outcome` only if the record is still at `revision`. Returns
    /// whether it was applied.
    pub(crate) async fn apply_if_unchanged(
        &self,
        idx: usize,
        revision: u64,
        outcome: StageOutcome,
    ) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(idx) {
            Some(record) if record.revision() == revision => {
                record.apply(outcome);
                true
            }
            Some(record) => {
                log::warn!(
                    "discarding {} result for item {}: record changed while the stage ran",
                    outcome.stage,
                    record.sequence_index()
                );
                false
            }
            None => false,
        }
    }

    /// Claims target names for the selected records under the lock. The
    /// renames themselves run after it is released.
    pub(crate) async fn plan_renames<F>(&self, renamer: &Renamer, select: F) -> RenamePlan
    where
        F: Fn(&ItemRecord) -> bool,
    {
        let mut records = self.records.write().await;
        renamer.plan(&mut records, select)
    }

    pub(crate) async fn finish_rename(
        &self,
        step: &PlannedRename,
        outcome: &Result<PathBuf, String>,
    ) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(step.idx) {
            rename::finish(record, step, outcome);
        }
    }

    pub async fn summary(&self, stopped: bool) -> BatchSummary {
        let records = self.records.read().await;
        let mut summary = BatchSummary {
            total: records.len(),
            stopped,
            ..BatchSummary::default()
        };

        for record in records.iter() {
            match record.status() {
                ItemStatus::Pending | ItemStatus::FrameExtracted | ItemStatus::OcrDone => {
                    summary.pending += 1
                }
                ItemStatus::TitleDone | ItemStatus::RenamePending => summary.title_done += 1,
                ItemStatus::Renamed => summary.renamed += 1,
                ItemStatus::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::record::{Stage, StageArtifact};

    fn batch() -> Batch {
        Batch::new(vec![
            ItemRecord::new(PathBuf::from("/v/b.mp4"), 2, 1),
            ItemRecord::new(PathBuf::from("/v/a.mp4"), 1, 1),
        ])
    }

    #[tokio::test]
    async fn test_records_kept_in_sequence_order() {
        let batch = batch();
        let order: Vec<_> = batch.records().await.iter().map(|r| r.sequence_index()).collect();
        assert_eq!(order, vec![1, 2]);
        assert_eq!(batch.position(2).await, Ok(1));
    }

    #[tokio::test]
    async fn test_unknown_item_edit() {
        assert_eq!(
            batch().set_title(9, "x").await.unwrap_err(),
            RecordError::UnknownItem { sequence_index: 9 }
        );
    }

    #[tokio::test]
    async fn test_stale_outcome_is_discarded() {
        let batch = batch();
        let snapshot = batch.snapshot_at(0).await.unwrap();
        batch.set_title(1, "Manual").await.unwrap();

        let outcome = StageOutcome {
            stage: Stage::Title,
            frame_index: None,
            result: Ok(StageArtifact::Title("From model".into())),
            started_event: Uuid::new_v4(),
        };
        assert!(!batch.apply_if_unchanged(0, snapshot.revision(), outcome).await);
        assert_eq!(batch.item(1).await.unwrap().title(), Some("Manual"));
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let batch = batch();
        batch.set_title(1, "Done").await.unwrap();
        let summary = batch.summary(false).await;
        assert_eq!(summary.total, 2);
        assert_eq!(summary.title_done, 1);
        assert_eq!(summary.pending, 1);
    }

    #[tokio::test]
    async fn test_records_readable_while_renames_are_planned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        std::fs::write(&path, b"").unwrap();
        let batch = Batch::new(vec![ItemRecord::new(path, 1, 1)]);
        batch.set_title(1, "Clip").await.unwrap();

        let plan = batch.plan_renames(&Renamer::default(), |_| true).await;
        assert_eq!(batch.item(1).await.unwrap().status(), &ItemStatus::RenamePending);
        assert_eq!(batch.summary(false).await.title_done, 1);

        let step = &plan.steps()[0];
        let outcome = plan.rename(step).await;
        batch.finish_rename(step, &outcome).await;

        let record = batch.item(1).await.unwrap();
        assert_eq!(record.status(), &ItemStatus::Renamed);
        assert_eq!(record.source_path(), dir.path().join("1-Clip.mp4"));
    }
}
