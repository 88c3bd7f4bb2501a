use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoTitlerError {
    #[error("Cannot read directory {path:?}: {reason}")]
    DirectoryError { path: PathBuf, reason: String },

    #[error("Missing API key for {provider_name}: set {env_var} or configure the key explicitly")]
    MissingApiKey {
        provider_name: String,
        env_var: String,
    },
}

pub type Result<T> = std::result::Result<T, VideoTitlerError>;
