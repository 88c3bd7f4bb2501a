use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::{
    http::{self, HttpFailure},
    provider::Provider,
};

pub const DEFAULT_SYSTEM_PROMPT: &str = "你是标题提炼助手。你会从杂乱的 OCR 文本中提取一个适合作为短视频标题的中文短句。\
标题是文本中的原文，具有以下特征\n\
- 通常是指引玩家动作的句子或短语\n\
只输出标题本身，不要解释，不要加引号，不要编号，不要换行，修复文本括号不配对的问题。";

pub const DEFAULT_USER_TEMPLATE: &str = "从以下 OCR 文本中提取一个适合作为标题的短句（尽量 ≤ 20 个汉字，必要时可包含数字/英文字母）。\n\n\
OCR 文本：\n{ocr_text}\n\n\
输出要求：只输出标题一行。";

const OCR_PLACEHOLDER: &str = "{ocr_text}";

static LABEL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(标题|title)[:：\s]+").expect("valid label regex"));

/// System prompt plus a user template with an `{ocr_text}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub system: String,
    pub user_template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_template: DEFAULT_USER_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Blank parts fall back to the defaults.
    pub fn new(system: &str, user_template: &str) -> Self {
        let defaults = Self::default();
        let pick = |value: &str, default: String| {
            let value = value.trim();
            if value.is_empty() { default } else { value.to_string() }
        };

        Self {
            system: pick(system, defaults.system),
            user_template: pick(user_template, defaults.user_template),
        }
    }

    pub fn render(&self, ocr_text: &str) -> String {
        if self.user_template.contains(OCR_PLACEHOLDER) {
            self.user_template.replace(OCR_PLACEHOLDER, ocr_text)
        } else {
            format!("{}\n\nOCR text:\n{}", self.user_template.trim_end(), ocr_text)
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TitleError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("title service error: {0}")]
    ServiceError(String),

    #[error("model returned no usable title")]
    EmptyResponse,

    #[error("recognized text is empty")]
    EmptyInput,
}

impl From<HttpFailure> for TitleError {
    fn from(failure: HttpFailure) -> Self {
        match &failure {
            HttpFailure::Status { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN =>
            {
                TitleError::AuthFailed(failure.to_string())
            }
            HttpFailure::Status { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS => {
                TitleError::RateLimited(failure.to_string())
            }
            _ => TitleError::ServiceError(failure.to_string()),
        }
    }
}

#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate(&self, text: &str, prompt: &PromptTemplate) -> Result<String, TitleError>;
}

/// Title generator over an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatTitleGenerator {
    http: reqwest::Client,
    provider: Provider,
    api_key: String,
    api_url: String,
    model: String,
    attempts: u32,
}

impl ChatTitleGenerator {
    pub fn new(provider: Provider, api_key: &str) -> Result<Self, TitleError> {
        let http = reqwest::Client::builder()
            .timeout(http::DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| TitleError::ServiceError(e.to_string()))?;
        let config = provider.config();

        Ok(Self {
            http,
            provider,
            api_key: api_key.trim().to_string(),
            api_url: chat_url(config.base_url),
            model: config.model.to_string(),
            attempts: http::DEFAULT_ATTEMPTS,
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        if !model.trim().is_empty() {
            self.model = model.trim().to_string();
        }
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        if !base_url.trim().is_empty() {
            self.api_url = chat_url(base_url);
        }
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn chat_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim().trim_end_matches('/'))
}

#[async_trait]
impl TitleGenerator for ChatTitleGenerator {
    async fn generate(&self, text: &str, prompt: &PromptTemplate) -> Result<String, TitleError> {
        if text.trim().is_empty() {
            return Err(TitleError::EmptyInput);
        }
        if self.api_key.is_empty() {
            return Err(TitleError::AuthFailed(format!(
                "no API key configured for {}",
                self.provider.name()
            )));
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.render(text) },
            ],
            "temperature": 0.2,
            "max_tokens": 80,
        });

        log::debug!("{} title request, model {}", self.provider.name(), self.model);
        let response = http::send_json_with_retry(
            || {
                self.http
                    .post(&self.api_url)
                    .header("Content-Type", "application/json")
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .json(&body)
            },
            self.attempts,
        )
        .await?;

        let content = extract_content(&response)?;
        let title = clean_title(content);
        if title.is_empty() {
            return Err(TitleError::EmptyResponse);
        }
        Ok(title)
    }
}

fn extract_content(response: &Value) -> Result<&str, TitleError> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| {
            TitleError::ServiceError(format!("unexpected response structure: {response}"))
        })
}

/// First non-empty line, without surrounding quotes or a leading "title:" label.
pub fn clean_title(content: &str) -> String {
    let line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    let unquoted = line.trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”') || c.is_whitespace());

    LABEL_PREFIX.replace(unquoted, "").trim().to_string()
}
