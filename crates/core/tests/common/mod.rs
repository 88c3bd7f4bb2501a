// Scripted stand-ins for the frame, OCR and title services.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::Notify;
use videotitler_core::{
    BatchPipeline, Collaborators, ExtractedFrame, FrameError, FrameExtractor, FrameImage,
    OcrError, OcrMode, PromptTemplate, RenameOptions, Renamer, StopSignal, TextRecognizer,
    TitleError, TitleGenerator,
};

/// "Extracts" a frame whose bytes are the video's file name.
#[derive(Default)]
pub struct FakeExtractor {
    pub calls: AtomicUsize,
    pub requested_frames: Mutex<Vec<u32>>,
    failures: Mutex<HashMap<String, String>>,
    stop_on_call: Mutex<Option<StopSignal>>,
}

impl FakeExtractor {
    pub fn fail(&self, file_name: &str, reason: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(file_name.to_string(), reason.to_string());
    }

    pub fn stop_during_next_call(&self, signal: StopSignal) {
        *self.stop_on_call.lock().unwrap() = Some(signal);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameExtractor for FakeExtractor {
    async fn extract(&self, video: &Path, frame_index: u32) -> Result<ExtractedFrame, FrameError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested_frames.lock().unwrap().push(frame_index);
        if let Some(signal) = self.stop_on_call.lock().unwrap().take() {
            signal.request();
        }

        let name = video.file_name().unwrap().to_string_lossy().into_owned();
        if let Some(reason) = self.failures.lock().unwrap().get(&name) {
            return Err(FrameError::DecodeFailed {
                reason: reason.clone(),
            });
        }

        Ok(ExtractedFrame {
            image: FrameImage {
                png: name.into_bytes(),
                width: 1,
                height: 1,
            },
            used_last_frame: false,
        })
    }
}

/// Reads back the file name carried in the frame as `text of <name>`.
#[derive(Default)]
pub struct FakeRecognizer {
    pub calls: AtomicUsize,
    failures: Mutex<HashMap<String, OcrError>>,
}

impl FakeRecognizer {
    pub fn fail(&self, file_name: &str, error: OcrError) {
        self.failures
            .lock()
            .unwrap()
            .insert(file_name.to_string(), error);
    }

    pub fn recover(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextRecognizer for FakeRecognizer {
    async fn recognize(&self, image: &FrameImage, _mode: OcrMode) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = String::from_utf8_lossy(&image.png).into_owned();
        if let Some(error) = self.failures.lock().unwrap().get(&name) {
            return Err(error.clone());
        }
        Ok(format!("text of {name}"))
    }
}

/// Turns `text of a.mp4` into `Clip a`. With a gate set, each call waits
/// for the gate after signalling `entered`.
#[derive(Default)]
pub struct FakeGenerator {
    pub calls: AtomicUsize,
    gate: Mutex<Option<Arc<Gate>>>,
    fixed_title: Mutex<Option<String>>,
}

#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl FakeGenerator {
    pub fn gated(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn always(&self, title: &str) {
        *self.fixed_title.lock().unwrap() = Some(title.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TitleGenerator for FakeGenerator {
    async fn generate(&self, text: &str, _prompt: &PromptTemplate) -> Result<String, TitleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if let Some(title) = self.fixed_title.lock().unwrap().clone() {
            return Ok(title);
        }
        let stem = text
            .trim_start_matches("text of ")
            .split('.')
            .next()
            .unwrap_or_default();
        Ok(format!("Clip {stem}"))
    }
}

pub struct Fakes {
    pub extractor: Arc<FakeExtractor>,
    pub recognizer: Arc<FakeRecognizer>,
    pub generator: Arc<FakeGenerator>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            extractor: Arc::new(FakeExtractor::default()),
            recognizer: Arc::new(FakeRecognizer::default()),
            generator: Arc::new(FakeGenerator::default()),
        }
    }

    pub fn pipeline(&self) -> BatchPipeline {
        BatchPipeline::new(
            Collaborators {
                extractor: self.extractor.clone(),
                recognizer: self.recognizer.clone(),
                generator: self.generator.clone(),
            },
            Renamer::new(RenameOptions::default()),
        )
    }

    pub fn total_calls(&self) -> usize {
        self.extractor.calls() + self.recognizer.calls() + self.generator.calls()
    }
}

pub fn video_dir(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        fs::write(dir.path().join(name), name.as_bytes()).unwrap();
    }
    dir
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
