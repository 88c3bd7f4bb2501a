use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use videotitler_core::{OcrMode, Provider};

const MAX_RECENT_DIRS: usize = 10;

/// Settings persisted between runs. Every field has a default so older or
/// hand-edited files still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input_dir: Option<PathBuf>,
    pub include_subdirs: bool,
    pub frame_index: u32,
    pub start_index: u32,
    pub index_padding: usize,
    pub preview: bool,
    pub baidu_api_key: String,
    pub baidu_secret_key: String,
    pub ocr_mode: OcrMode,
    pub title_provider: Provider,
    pub title_api_key: String,
    pub title_base_url: String,
    pub title_model: String,
    pub system_prompt: String,
    pub user_prompt_template: String,
    pub save_keys_locally: bool,
    pub recent_dirs: Vec<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_dir: None,
            include_subdirs: false,
            frame_index: 1,
            start_index: 1,
            index_padding: 3,
            preview: false,
            baidu_api_key: String::new(),
            baidu_secret_key: String::new(),
            ocr_mode: OcrMode::default(),
            title_provider: Provider::default(),
            title_api_key: String::new(),
            title_base_url: String::new(),
            title_model: String::new(),
            system_prompt: String::new(),
            user_prompt_template: String::new(),
            save_keys_locally: false,
            recent_dirs: Vec::new(),
        }
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("videotitler").join("config.json"))
}

impl AppConfig {
    /// Missing file gives defaults; so does a broken one, with a warning.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                log::debug!("no settings at {}: {e}", path.display());
                return Self::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("ignoring unreadable settings {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut stored = self.clone();
        if !stored.save_keys_locally {
            stored.baidu_api_key.clear();
            stored.baidu_secret_key.clear();
            stored.title_api_key.clear();
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&stored)?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Moves `dir` to the front of the recent list.
    pub fn remember_dir(&mut self, dir: &Path) {
        self.recent_dirs.retain(|d| d != dir);
        self.recent_dirs.insert(0, dir.to_path_buf());
        self.recent_dirs.truncate(MAX_RECENT_DIRS);
    }

    /// Explicit value if set, otherwise the environment variable.
    pub fn baidu_keys(&self) -> Option<(String, String)> {
        let pick = |value: &str, var: &str| {
            let value = value.trim();
            if value.is_empty() {
                std::env::var(var).ok().filter(|v| !v.trim().is_empty())
            } else {
                Some(value.to_string())
            }
        };
        Some((
            pick(&self.baidu_api_key, "BAIDU_API_KEY")?,
            pick(&self.baidu_secret_key, "BAIDU_SECRET_KEY")?,
        ))
    }
}
