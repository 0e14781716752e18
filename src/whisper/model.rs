use std::path::Path;

use whisper_rs::{WhisperContext, WhisperContextParameters};

#[derive(Debug)]
pub enum ModelError {
    /// No model file at the expected path.
    FileNotFound(String),
    /// The path is not valid UTF-8, which the whisper bindings require.
    InvalidPath(String),
    /// The file exists but could not be loaded as a ggml model.
    Load(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileNotFound(path) => write!(f, "model file not found: {path}"),
            Self::InvalidPath(path) => write!(f, "model path is not valid UTF-8: {path}"),
            Self::Load(msg) => write!(f, "model load failed: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

/// A loaded ggml whisper model. Loading is expensive (hundreds of MB read
/// into memory), so instances are shared behind `Arc` and kept for the
/// lifetime of the process.
pub struct WhisperModel {
    context: WhisperContext,
}

// The underlying whisper.cpp context is immutable after load; all mutable
// inference state lives in per-call `WhisperState` values.
unsafe impl Send for WhisperModel {}
unsafe impl Sync for WhisperModel {}

impl WhisperModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::FileNotFound(path.display().to_string()));
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| ModelError::InvalidPath(path.display().to_string()))?;

        let context =
            WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
                .map_err(|err| ModelError::Load(err.to_string()))?;

        tracing::info!("🧠 Loaded whisper model from {path_str}");
        Ok(Self { context })
    }

    pub fn context(&self) -> &WhisperContext {
        &self.context
    }
}
