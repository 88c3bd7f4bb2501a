use std::{any::Any, path::PathBuf, time::SystemTime};

use serde::Serialize;
use uuid::Uuid;

use crate::{
    batch::BatchSummary,
    events::{Event, EventHeader},
    record::Stage,
};

macro_rules! impl_event {
    ($ty:ty, $name:literal) => {
        impl_event!($ty, $name, {});
    };
    ($ty:ty, $name:literal, per_item) => {
        impl_event!($ty, $name, {
            fn sequence_index(&self) -> Option<u32> {
                Some(self.sequence_index)
            }
        });
    };
    ($ty:ty, $name:literal, { $($extra:tt)* }) => {
        impl $ty {
            pub const EVENT_TYPE: &'static str = $name;
        }

        impl Event for $ty {
            fn event_id(&self) -> Uuid {
                self.header.event_id
            }

            fn parent_ids(&self) -> &[Uuid] {
                &self.header.parent_ids
            }

            fn event_type(&self) -> &'static str {
                Self::EVENT_TYPE
            }

            fn timestamp(&self) -> SystemTime {
                self.header.timestamp
            }

            $($extra)*

            fn as_any(&self) -> &dyn Any {
                self as &dyn Any
            }
        }
    };
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchScanned {
    pub header: EventHeader,
    pub directory: PathBuf,
    pub total: usize,
}

impl BatchScanned {
    pub fn new(directory: PathBuf, total: usize) -> Self {
        Self {
            header: EventHeader::root(),
            directory,
            total,
        }
    }
}

impl_event!(BatchScanned, "batch.scanned");

#[derive(Clone, Debug, Serialize)]
pub struct BatchStarted {
    pub header: EventHeader,
    /// Items that still have stages to run.
    pub runnable: usize,
    pub preview: bool,
}

impl BatchStarted {
    pub fn new(runnable: usize, preview: bool) -> Self {
        Self {
            header: EventHeader::root(),
            runnable,
            preview,
        }
    }
}

impl_event!(BatchStarted, "batch.started");

#[derive(Clone, Debug, Serialize)]
pub struct StageStarted {
    pub header: EventHeader,
    pub sequence_index: u32,
    pub stage: Stage,
}

impl StageStarted {
    pub fn new(sequence_index: u32, stage: Stage) -> Self {
        Self {
            header: EventHeader::root(),
            sequence_index,
            stage,
        }
    }
}

impl_event!(StageStarted, "item.stage_started", per_item);

#[derive(Clone, Debug, Serialize)]
pub struct StageCompleted {
    pub header: EventHeader,
    pub sequence_index: u32,
    pub stage: Stage,
    /// Recognized text or title produced by the stage.
    pub output: Option<String>,
}

impl StageCompleted {
    pub fn new(parent: Uuid, sequence_index: u32, stage: Stage, output: Option<String>) -> Self {
        Self {
            header: EventHeader::child_of(parent),
            sequence_index,
            stage,
            output,
        }
    }
}

impl_event!(StageCompleted, "item.stage_completed", per_item);

#[derive(Clone, Debug, Serialize)]
pub struct ItemFailed {
    pub header: EventHeader,
    pub sequence_index: u32,
    pub stage: Stage,
    pub message: String,
}

impl ItemFailed {
    pub fn new(parents: Vec<Uuid>, sequence_index: u32, stage: Stage, message: String) -> Self {
        Self {
            header: EventHeader::new(parents),
            sequence_index,
            stage,
            message,
        }
    }
}

impl_event!(ItemFailed, "item.failed", per_item);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    OcrText,
    Title,
    Reset,
}

#[derive(Clone, Debug, Serialize)]
pub struct ItemEdited {
    pub header: EventHeader,
    pub sequence_index: u32,
    pub kind: EditKind,
}

impl ItemEdited {
    pub fn new(sequence_index: u32, kind: EditKind) -> Self {
        Self {
            header: EventHeader::root(),
            sequence_index,
            kind,
        }
    }
}

impl_event!(ItemEdited, "item.edited", per_item);

#[derive(Clone, Debug, Serialize)]
pub struct ItemRenamed {
    pub header: EventHeader,
    pub sequence_index: u32,
    pub from: PathBuf,
    pub to: PathBuf,
}

impl ItemRenamed {
    pub fn new(sequence_index: u32, from: PathBuf, to: PathBuf) -> Self {
        Self {
            header: EventHeader::root(),
            sequence_index,
            from,
            to,
        }
    }
}

impl_event!(ItemRenamed, "item.renamed", per_item);

#[derive(Clone, Debug, Serialize)]
pub struct BatchFinished {
    pub header: EventHeader,
    pub summary: BatchSummary,
}

impl BatchFinished {
    pub fn new(summary: BatchSummary) -> Self {
        Self {
            header: EventHeader::root(),
            summary,
        }
    }
}

impl_event!(BatchFinished, "batch.finished");

pub const ALL_EVENT_TYPES: &[&str] = &[
    BatchScanned::EVENT_TYPE,
    BatchStarted::EVENT_TYPE,
    StageStarted::EVENT_TYPE,
    StageCompleted::EVENT_TYPE,
    ItemFailed::EVENT_TYPE,
    ItemEdited::EVENT_TYPE,
    ItemRenamed::EVENT_TYPE,
    BatchFinished::EVENT_TYPE,
];

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::events::downcast_ref;

    #[test]
    fn test_events_serialize_through_trait_object() {
        let started = StageStarted::new(4, Stage::Ocr);
        let failed: Arc<dyn Event> = Arc::new(ItemFailed::new(
            vec![started.event_id()],
            4,
            Stage::Ocr,
            "rate limited".into(),
        ));

        let json = serde_json::to_value(&*failed).unwrap();
        assert_eq!(json["stage"], "ocr");
        assert_eq!(json["sequence_index"], 4);
        assert_eq!(json["header"]["parent_ids"][0], started.event_id().to_string());
        assert_eq!(failed.sequence_index(), Some(4));
        assert!(downcast_ref::<ItemFailed>(&failed).is_some());
    }

    #[test]
    fn test_batch_events_have_no_item() {
        let scanned = BatchScanned::new(PathBuf::from("/v"), 3);
        assert_eq!(scanned.sequence_index(), None);
        assert_eq!(scanned.event_type(), "batch.scanned");

        let started = BatchStarted::new(2, true);
        assert_eq!(started.sequence_index(), None);
        assert_eq!(started.event_type(), BatchStarted::EVENT_TYPE);

        let renamed = ItemRenamed::new(7, PathBuf::from("/v/a.mp4"), PathBuf::from("/v/7-A.mp4"));
        assert_eq!(renamed.sequence_index(), Some(7));
        assert_eq!(renamed.event_type(), "item.renamed");
    }
}
