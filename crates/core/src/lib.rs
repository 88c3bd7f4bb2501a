//! Batch video titling: read on-screen text from one frame of each video,
//! turn it into a short title with a language model and rename the files in
//! scan order.
//!
//! The pipeline only talks to its collaborators through the
//! [`FrameExtractor`], [`TextRecognizer`] and [`TitleGenerator`] traits;
//! ffmpeg, Baidu OCR and OpenAI-compatible chat implementations ship here.

pub mod batch;
pub mod controller;
pub mod error;
pub mod events;
pub mod frame;
pub mod http;
pub mod ocr;
pub mod pipeline;
pub mod provider;
pub mod queues;
pub mod record;
pub mod rename;
pub mod routes;
pub mod scan;
pub mod title;
pub mod view;
pub mod workers;

pub use batch::{Batch, BatchSummary};
pub use controller::{BatchController, ControlCommand, ControllerError};
pub use error::{Result, VideoTitlerError};
pub use frame::{ExtractedFrame, FfmpegFrameExtractor, FrameError, FrameExtractor, FrameImage};
pub use ocr::{BaiduOcrClient, OcrError, OcrMode, TextRecognizer};
pub use pipeline::{BatchPipeline, Collaborators, PipelineOptions, StopSignal};
pub use provider::{Provider, ProviderConfig};
pub use record::{ItemRecord, ItemStatus, RecordError, Stage};
pub use rename::{CommitReport, RenameOptions, Renamer, sanitize_title};
pub use scan::{ScanOptions, VIDEO_EXTENSIONS, natural_cmp, scan_directory};
pub use title::{ChatTitleGenerator, PromptTemplate, TitleError, TitleGenerator};
pub use view::ItemView;
