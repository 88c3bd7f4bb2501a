use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use image::GenericImageView;
use thiserror::Error;
use tokio::process::Command;

/// A single decoded video frame, kept as PNG bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl FrameImage {
    pub fn from_png(png: Vec<u8>) -> Result<Self, FrameError> {
        let decoded = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
            .map_err(|e| FrameError::DecodeFailed {
                reason: e.to_string(),
            })?;
        let (width, height) = decoded.dimensions();

        Ok(Self { png, width, height })
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Video file not found: {path:?}")]
    NotFound { path: PathBuf },

    #[error("Cannot decode video: {reason}")]
    DecodeFailed { reason: String },

    #[error("Frame {frame_index} is past the end of the video")]
    FrameOutOfRange { frame_index: u32 },

    #[error("Frame extraction timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Frame extractor unavailable: {reason}")]
    Unavailable { reason: String },
}

#[derive(Debug, Clone)]
pub struct ExtractedFrame {
    pub image: FrameImage,
    /// Set when the requested frame was past the end and the last frame was used.
    pub used_last_frame: bool,
}

#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract(&self, video: &Path, frame_index: u32) -> Result<ExtractedFrame, FrameError>;
}

/// Extracts frames by shelling out to `ffmpeg`.
///
/// Frame indices are 1-based. When the requested frame lies past the end of a
/// short clip the last frame is used instead, unless that fallback is off.
pub struct FfmpegFrameExtractor {
    binary: PathBuf,
    timeout: Duration,
    fallback_to_last_frame: bool,
}

impl Default for FfmpegFrameExtractor {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            timeout: Duration::from_secs(60),
            fallback_to_last_frame: true,
        }
    }
}

impl FfmpegFrameExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fallback_to_last_frame(mut self, enabled: bool) -> Self {
        self.fallback_to_last_frame = enabled;
        self
    }

    fn select_command(&self, video: &Path, frame_index: u32) -> Command {
        let zero_based = frame_index.saturating_sub(1);
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-nostdin")
            .arg("-i")
            .arg(video)
            .arg("-map")
            .arg("0:v:0")
            .arg("-vf")
            .arg(format!("select=eq(n\\,{zero_based})"))
            .arg("-frames:v")
            .arg("1")
            .arg("-f")
            .arg("image2pipe")
            .arg("-vcodec")
            .arg("png")
            .arg("pipe:1");
        cmd
    }

    fn last_frame_command(&self, video: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-nostdin")
            .arg("-sseof")
            .arg("-0.1")
            .arg("-i")
            .arg(video)
            .arg("-map")
            .arg("0:v:0")
            .arg("-frames:v")
            .arg("1")
            .arg("-f")
            .arg("image2pipe")
            .arg("-vcodec")
            .arg("png")
            .arg("pipe:1");
        cmd
    }

    /// Runs ffmpeg and returns the PNG written to stdout, or `None` if it
    /// exited cleanly without emitting a frame.
    async fn run(&self, mut cmd: Command) -> Result<Option<Vec<u8>>, FrameError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(FrameError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FrameError::Unavailable {
                    reason: format!("{} not found on PATH", self.binary.display()),
                });
            }
            Ok(Err(e)) => {
                return Err(FrameError::Unavailable {
                    reason: e.to_string(),
                });
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FrameError::DecodeFailed {
                reason: stderr.trim().lines().last().unwrap_or("ffmpeg failed").to_string(),
            });
        }

        if output.stdout.is_empty() {
            return Ok(None);
        }

        Ok(Some(output.stdout))
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract(&self, video: &Path, frame_index: u32) -> Result<ExtractedFrame, FrameError> {
        if !video.is_file() {
            return Err(FrameError::NotFound {
                path: video.to_path_buf(),
            });
        }

        if frame_index == 0 {
            return Err(FrameError::FrameOutOfRange { frame_index });
        }

        if let Some(png) = self.run(self.select_command(video, frame_index)).await? {
            return Ok(ExtractedFrame {
                image: FrameImage::from_png(png)?,
                used_last_frame: false,
            });
        }

        if !self.fallback_to_last_frame {
            return Err(FrameError::FrameOutOfRange { frame_index });
        }

        log::info!(
            "{}: frame {} out of range, using last frame",
            video.display(),
            frame_index
        );
        match self.run(self.last_frame_command(video)).await? {
            Some(png) => Ok(ExtractedFrame {
                image: FrameImage::from_png(png)?,
                used_last_frame: true,
            }),
            None => Err(FrameError::FrameOutOfRange { frame_index }),
        }
    }
}
