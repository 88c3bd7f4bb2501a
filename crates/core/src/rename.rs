use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;

use crate::record::ItemRecord;

pub const FALLBACK_TITLE: &str = "untitled";
pub const MAX_TITLE_CHARS: usize = 80;

static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F\x7F]"#).expect("valid filename regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenameOptions {
    pub start_index: u32,
    pub index_padding: usize,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            start_index: 1,
            index_padding: 1,
        }
    }
}

/// Makes a title safe to use as a file name component on every common filesystem.
pub fn sanitize_title(title: &str) -> String {
    let cleaned = title.replace('\u{200b}', " ");
    let cleaned = INVALID_CHARS.replace_all(&cleaned, " ");
    let cleaned = WHITESPACE.replace_all(&cleaned, " ");
    let cleaned = cleaned.trim_matches(|c| c == ' ' || c == '.');

    if cleaned.is_empty() {
        return FALLBACK_TITLE.to_string();
    }

    cleaned
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub sequence_index: u32,
    pub from: PathBuf,
    pub outcome: Result<PathBuf, String>,
}

/// Turns titled records into ordered `{prefix}-{title}{ext}` file names.
#[derive(Debug, Clone, Default)]
pub struct Renamer {
    options: RenameOptions,
}

impl Renamer {
    pub fn new(options: RenameOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> RenameOptions {
        self.options
    }

    pub fn prefix(&self, sequence_index: u32) -> String {
        let number = u64::from(self.options.start_index) + u64::from(sequence_index) - 1;
        format!("{:0width$}", number, width = self.options.index_padding.max(1))
    }

    fn target_name(&self, record: &ItemRecord, title: &str) -> String {
        let extension = record
            .source_path()
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        format!(
            "{}-{}{}",
            self.prefix(record.sequence_index()),
            sanitize_title(title),
            extension
        )
    }

    /// Name a commit would give the record right now, ignoring collisions.
    pub fn proposed_name(&self, record: &ItemRecord) -> Option<String> {
        record.title().map(|title| self.target_name(record, title))
    }

    /// Claims a target name for every record accepted by `select` that has a
    /// title to commit and marks it rename-pending. Names claimed within the
    /// batch never collide. Nothing on disk changes yet.
    pub fn plan<F>(&self, records: &mut [ItemRecord], select: F) -> RenamePlan
    where
        F: Fn(&ItemRecord) -> bool,
    {
        let mut plan = RenamePlan::default();

        for (idx, record) in records.iter_mut().enumerate() {
            if !select(record) || !record.can_commit() {
                continue;
            }
            let Some(title) = record.title().map(str::to_string) else {
                continue;
            };

            let target = resolve_target(
                record.source_path(),
                &self.target_name(record, &title),
                record.sequence_index(),
                &plan.claimed,
            );
            plan.claimed.insert(target.clone());
            record.mark_rename_pending(file_name_of(&target));
            plan.steps.push(PlannedRename {
                idx,
                sequence_index: record.sequence_index(),
                from: record.source_path().to_path_buf(),
                target,
                revision: record.revision(),
            });
        }
        plan
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRename {
    /// Position of the record in the batch.
    pub idx: usize,
    pub sequence_index: u32,
    pub from: PathBuf,
    pub target: PathBuf,
    /// Record revision right after it was marked rename-pending.
    pub revision: u64,
}

impl PlannedRename {
    pub fn report(&self, outcome: Result<PathBuf, String>) -> CommitReport {
        CommitReport {
            sequence_index: self.sequence_index,
            from: self.from.clone(),
            outcome,
        }
    }
}

#[derive(Debug, Default)]
pub struct RenamePlan {
    steps: Vec<PlannedRename>,
    claimed: HashSet<PathBuf>,
}

impl RenamePlan {
    pub fn steps(&self) -> &[PlannedRename] {
        &self.steps
    }

    /// Moves one planned file and returns where it ended up. A filesystem
    /// error fails only this step.
    pub async fn rename(&self, step: &PlannedRename) -> Result<PathBuf, String> {
        if step.target == step.from {
            return Ok(step.target.clone());
        }

        // something may have appeared at the target since planning
        let target = if tokio::fs::try_exists(&step.target).await.unwrap_or(true) {
            resolve_target(
                &step.from,
                &file_name_of(&step.target),
                step.sequence_index,
                &self.claimed,
            )
        } else {
            step.target.clone()
        };

        // not atomic with the check above: a file created at `target` in
        // between is replaced on platforms where rename overwrites
        tokio::fs::rename(&step.from, &target)
            .await
            .map_err(|e| format!("cannot rename to {}: {e}", target.display()))?;
        Ok(target)
    }
}

/// Writes the outcome of `step` back to its record. A moved file always
/// moves the record with it; a failure only lands if nobody edited the
/// record while the rename ran.
pub(crate) fn finish(
    record: &mut ItemRecord,
    step: &PlannedRename,
    outcome: &Result<PathBuf, String>,
) {
    let edited = record.revision() != step.revision;
    match outcome {
        Ok(to) => {
            log::info!("renamed {} -> {}", step.from.display(), to.display());
            if edited {
                log::warn!(
                    "item {} was edited while being renamed, the file keeps its new name",
                    step.sequence_index
                );
            }
            record.mark_renamed(to.clone());
        }
        Err(message) => {
            log::warn!("rename of {} failed: {message}", step.from.display());
            if !edited {
                record.mark_commit_failed(message.clone());
            }
        }
    }
}

/// Picks a free path for `name` next to `source`: the name itself, then
/// `{stem}_{seq}{ext}`, then `{stem}_{seq}_{n}{ext}` for n = 2, 3, ...
fn resolve_target(
    source: &Path,
    name: &str,
    sequence_index: u32,
    claimed: &HashSet<PathBuf>,
) -> PathBuf {
    let dir = source.parent().unwrap_or_else(|| Path::new("."));
    let candidate = dir.join(name);
    if candidate == source {
        return candidate;
    }

    let taken = |path: &Path| path != source && (claimed.contains(path) || path.exists());
    if !taken(&candidate) {
        return candidate;
    }

    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = as_path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let candidate = dir.join(format!("{stem}_{sequence_index}{extension}"));
    if !taken(&candidate) {
        return candidate;
    }

    (2u32..)
        .map(|n| dir.join(format!("{stem}_{sequence_index}_{n}{extension}")))
        .find(|candidate| !taken(candidate))
        .unwrap_or(candidate)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::record::ItemStatus;

    #[test]
    fn test_sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_title("a/b:c*d?"), "a b c d");
        assert_eq!(sanitize_title("  ..hello\u{200b}  world..  "), "hello world");
        assert_eq!(sanitize_title("tab\tand\nnewline"), "tab and newline");
    }

    #[test]
    fn test_sanitize_fallback_and_truncation() {
        assert_eq!(sanitize_title(" ... "), FALLBACK_TITLE);
        assert_eq!(sanitize_title("<>|"), FALLBACK_TITLE);

        let long = "标".repeat(100);
        assert_eq!(sanitize_title(&long).chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_prefix_padding_and_offset() {
        let renamer = Renamer::default();
        assert_eq!(renamer.prefix(7), "7");

        let renamer = Renamer::new(RenameOptions {
            start_index: 10,
            index_padding: 3,
        });
        assert_eq!(renamer.prefix(1), "010");
        assert_eq!(renamer.prefix(995), "1004");
    }

    #[test]
    fn test_proposed_name_keeps_extension() {
        let mut record = ItemRecord::new(PathBuf::from("/v/raw clip.MOV"), 2, 1);
        assert_eq!(Renamer::default().proposed_name(&record), None);

        record.set_title("Boss: phase 2").unwrap();
        assert_eq!(
            Renamer::default().proposed_name(&record).as_deref(),
            Some("2-Boss phase 2.MOV")
        );
    }

    fn titled(dir: &Path, file: &str, seq: u32, title: &str) -> ItemRecord {
        let path = dir.join(file);
        fs::write(&path, file.as_bytes()).unwrap();
        let mut record = ItemRecord::new(path, seq, 1);
        record.set_title(title).unwrap();
        record
    }

    async fn commit_all(renamer: &Renamer, records: &mut [ItemRecord]) -> Vec<CommitReport> {
        let plan = renamer.plan(records, |_| true);
        let mut reports = Vec::new();
        for step in plan.steps() {
            let outcome = plan.rename(step).await;
            finish(&mut records[step.idx], step, &outcome);
            reports.push(step.report(outcome));
        }
        reports
    }

    #[tokio::test]
    async fn test_duplicate_titles_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut records = vec![
            titled(dir.path(), "a.mp4", 1, "Same"),
            titled(dir.path(), "b.mp4", 2, "Same"),
        ];
        // an unrelated file already sits where record 2 would go
        fs::write(dir.path().join("2-Same.mp4"), b"keep me").unwrap();

        let reports = commit_all(&Renamer::default(), &mut records).await;

        assert_eq!(reports.len(), 2);
        assert_eq!(records[0].final_name(), Some("1-Same.mp4"));
        assert_eq!(records[1].final_name(), Some("2-Same_2.mp4"));
        assert!(records.iter().all(|r| r.status() == &ItemStatus::Renamed));
        assert_eq!(fs::read(dir.path().join("2-Same.mp4")).unwrap(), b"keep me");
        assert_eq!(fs::read(dir.path().join("2-Same_2.mp4")).unwrap(), b"b.mp4");
    }

    #[tokio::test]
    async fn test_suffix_counter_after_sequence_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1-X.mp4"), b"").unwrap();
        fs::write(dir.path().join("1-X_1.mp4"), b"").unwrap();
        let mut records = vec![titled(dir.path(), "src.mp4", 1, "X")];

        commit_all(&Renamer::default(), &mut records).await;

        assert_eq!(records[0].final_name(), Some("1-X_1_2.mp4"));
        assert!(dir.path().join("1-X_1_2.mp4").exists());
    }

    #[tokio::test]
    async fn test_same_name_is_renamed_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut records = vec![titled(dir.path(), "1-Done.mp4", 1, "Done")];

        let reports = commit_all(&Renamer::default(), &mut records).await;

        assert_eq!(reports[0].outcome, Ok(dir.path().join("1-Done.mp4")));
        assert_eq!(records[0].status(), &ItemStatus::Renamed);
    }

    #[tokio::test]
    async fn test_missing_source_fails_only_that_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut records = vec![
            titled(dir.path(), "a.mp4", 1, "One"),
            titled(dir.path(), "b.mp4", 2, "Two"),
        ];
        fs::remove_file(dir.path().join("a.mp4")).unwrap();

        commit_all(&Renamer::default(), &mut records).await;

        assert!(records[0].status().is_failed());
        assert_eq!(records[0].final_name(), None);
        assert_eq!(records[1].status(), &ItemStatus::Renamed);
        assert!(dir.path().join("2-Two.mp4").exists());
    }

    #[tokio::test]
    async fn test_untitled_records_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        fs::write(&path, b"").unwrap();
        let mut records = vec![ItemRecord::new(path.clone(), 1, 1)];

        let reports = commit_all(&Renamer::default(), &mut records).await;

        assert!(reports.is_empty());
        assert_eq!(records[0].status(), &ItemStatus::Pending);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_target_taken_after_planning_records_actual_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut records = vec![titled(dir.path(), "a.mp4", 1, "Late")];
        let plan = Renamer::default().plan(&mut records, |_| true);
        assert_eq!(records[0].final_name(), Some("1-Late.mp4"));

        fs::write(dir.path().join("1-Late.mp4"), b"arrived first").unwrap();
        let step = &plan.steps()[0];
        let outcome = plan.rename(step).await;
        finish(&mut records[0], step, &outcome);

        assert_eq!(outcome, Ok(dir.path().join("1-Late_1.mp4")));
        assert_eq!(records[0].final_name(), Some("1-Late_1.mp4"));
        assert_eq!(records[0].source_path(), dir.path().join("1-Late_1.mp4"));
        assert_eq!(fs::read(dir.path().join("1-Late.mp4")).unwrap(), b"arrived first");
    }

    #[tokio::test]
    async fn test_failed_rename_keeps_edit_made_meanwhile() {
        let dir = tempfile::tempdir().unwrap();
        let mut records = vec![titled(dir.path(), "a.mp4", 1, "First")];
        let plan = Renamer::default().plan(&mut records, |_| true);
        fs::remove_file(dir.path().join("a.mp4")).unwrap();
        records[0].set_title("Second").unwrap();

        let step = &plan.steps()[0];
        let outcome = plan.rename(step).await;
        finish(&mut records[0], step, &outcome);

        assert!(outcome.is_err());
        assert_eq!(records[0].status(), &ItemStatus::TitleDone);
        assert_eq!(records[0].title(), Some("Second"));
    }
}
