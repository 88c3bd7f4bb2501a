use std::{
    borrow::Cow,
    io::Cursor,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use image::{GenericImageView, codecs::jpeg::JpegEncoder};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    frame::FrameImage,
    http::{self, HttpFailure},
};

const TOKEN_URL: &str = "https://aip.baidubce.com/oauth/2.0/token";
const OCR_BASE_URL: &str = "https://aip.baidubce.com/rest/2.0/ocr/v1";

const UPLOAD_LIMIT_BYTES: usize = 2_000_000;
const UPLOAD_MAX_SIDE: u32 = 1600;
const UPLOAD_JPEG_QUALITY: u8 = 88;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrMode {
    #[default]
    #[serde(alias = "accurate_basic")]
    Accurate,
    #[serde(alias = "general_basic")]
    General,
}

impl OcrMode {
    pub fn endpoint(&self) -> &'static str {
        match self {
            OcrMode::Accurate => "accurate_basic",
            OcrMode::General => "general_basic",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OcrError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("OCR service error: {0}")]
    ServiceError(String),
}

impl From<HttpFailure> for OcrError {
    fn from(failure: HttpFailure) -> Self {
        match &failure {
            HttpFailure::Status { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS => {
                OcrError::RateLimited(failure.to_string())
            }
            HttpFailure::Status { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN =>
            {
                OcrError::AuthFailed(failure.to_string())
            }
            _ => OcrError::ServiceError(failure.to_string()),
        }
    }
}

#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &FrameImage, mode: OcrMode) -> Result<String, OcrError>;
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Baidu general-text OCR over its REST API.
pub struct BaiduOcrClient {
    http: reqwest::Client,
    api_key: String,
    secret_key: String,
    token_url: String,
    ocr_base_url: String,
    attempts: u32,
    token: Mutex<Option<CachedToken>>,
}

impl BaiduOcrClient {
    pub fn new(api_key: &str, secret_key: &str) -> Result<Self, OcrError> {
        let http = reqwest::Client::builder()
            .timeout(http::DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| OcrError::ServiceError(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.trim().to_string(),
            secret_key: secret_key.trim().to_string(),
            token_url: TOKEN_URL.to_string(),
            ocr_base_url: OCR_BASE_URL.to_string(),
            attempts: http::DEFAULT_ATTEMPTS,
            token: Mutex::new(None),
        })
    }

    pub fn with_base_urls(mut self, token_url: &str, ocr_base_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self.ocr_base_url = ocr_base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    async fn access_token(&self) -> Result<String, OcrError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        if self.api_key.is_empty() || self.secret_key.is_empty() {
            return Err(OcrError::AuthFailed(
                "Baidu OCR API key and secret key are required".into(),
            ));
        }

        log::debug!("requesting Baidu OCR access token");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.api_key.as_str()),
            ("client_secret", self.secret_key.as_str()),
        ];
        let payload = http::send_json_with_retry(
            || self.http.post(&self.token_url).form(&form),
            self.attempts,
        )
        .await
        .map_err(|e| OcrError::AuthFailed(format!("cannot obtain access token: {e}")))?;

        let (value, expires_in) = parse_token_response(&payload)?;
        let lifetime = Duration::from_secs(expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *cached = Some(CachedToken {
            value: value.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }
}

#[async_trait]
impl TextRecognizer for BaiduOcrClient {
    async fn recognize(&self, image: &FrameImage, mode: OcrMode) -> Result<String, OcrError> {
        let token = self.access_token().await?;
        let upload = shrink_for_upload(image);
        let encoded = STANDARD.encode(upload.as_ref());
        let url = format!("{}/{}", self.ocr_base_url, mode.endpoint());

        log::debug!(
            "OCR {} request, {} bytes ({}x{})",
            mode.endpoint(),
            upload.len(),
            image.width,
            image.height
        );
        let form = [
            ("image", encoded.as_str()),
            ("language_type", "CHN_ENG"),
            ("detect_direction", "true"),
        ];
        let payload = http::send_json_with_retry(
            || {
                self.http
                    .post(&url)
                    .query(&[("access_token", token.as_str())])
                    .form(&form)
            },
            self.attempts,
        )
        .await?;

        let result = parse_ocr_response(&payload);
        if let Err(OcrError::AuthFailed(_)) = &result {
            self.invalidate_token().await;
        }
        result
    }
}

fn parse_token_response(payload: &Value) -> Result<(String, u64), OcrError> {
    match payload["access_token"].as_str() {
        Some(token) if !token.is_empty() => {
            Ok((token.to_string(), payload["expires_in"].as_u64().unwrap_or(0)))
        }
        _ => {
            let reason = payload["error_description"]
                .as_str()
                .or_else(|| payload["error"].as_str())
                .map(str::to_string)
                .unwrap_or_else(|| payload.to_string());
            Err(OcrError::AuthFailed(format!("cannot obtain access token: {reason}")))
        }
    }
}

fn parse_ocr_response(payload: &Value) -> Result<String, OcrError> {
    if let Some(code) = payload["error_code"].as_i64() {
        let message = payload["error_msg"].as_str().unwrap_or("unknown error");
        return Err(classify_error_code(code, message));
    }

    let words = payload["words_result"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["words"].as_str())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(join_words(&words))
}

fn classify_error_code(code: i64, message: &str) -> OcrError {
    let detail = format!("error {code}: {message}");
    match code {
        17 | 18 | 19 => OcrError::RateLimited(detail),
        6 | 14 | 110 | 111 => OcrError::AuthFailed(detail),
        _ => OcrError::ServiceError(detail),
    }
}

fn join_words(words: &[&str]) -> String {
    words
        .iter()
        .filter(|w| !w.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Large frames are downscaled and re-encoded as JPEG before upload. The
/// original bytes are kept whenever re-encoding fails or does not help.
fn shrink_for_upload(image: &FrameImage) -> Cow<'_, [u8]> {
    if image.png.len() <= UPLOAD_LIMIT_BYTES {
        return Cow::Borrowed(&image.png);
    }

    match reencode_as_jpeg(&image.png) {
        Ok(jpeg) if jpeg.len() < image.png.len() => Cow::Owned(jpeg),
        Ok(_) => Cow::Borrowed(&image.png),
        Err(e) => {
            log::warn!("cannot shrink frame for upload, sending original: {e}");
            Cow::Borrowed(&image.png)
        }
    }
}

fn reencode_as_jpeg(png: &[u8]) -> image::ImageResult<Vec<u8>> {
    let mut decoded = image::load_from_memory(png)?;
    let (width, height) = decoded.dimensions();
    if width.max(height) > UPLOAD_MAX_SIDE {
        decoded = decoded.thumbnail(UPLOAD_MAX_SIDE, UPLOAD_MAX_SIDE);
    }

    let rgb = decoded.to_rgb8();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, UPLOAD_JPEG_QUALITY).encode_image(&rgb)?;
    Ok(out.into_inner())
}
