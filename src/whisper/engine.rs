use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use whisper_rs::{FullParams, SamplingStrategy};

use super::model::{ModelError, WhisperModel};

/// Model sizes the engine will load.
pub const MODEL_SIZES: &[&str] = &["tiny", "base", "small", "medium", "large-v3"];

const BEAM_SIZE: usize = 5;

#[derive(Debug)]
pub enum EngineError {
    /// Not one of the supported model sizes.
    UnknownModel(String),
    Model(ModelError),
    /// Could not create an inference state on the loaded model.
    State(String),
    /// The inference run itself failed.
    Inference(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownModel(size) => write!(f, "unknown whisper model size: {size}"),
            Self::Model(err) => write!(f, "{err}"),
            Self::State(msg) => write!(f, "whisper state creation failed: {msg}"),
            Self::Inference(msg) => write!(f, "whisper inference failed: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        Self::Model(err)
    }
}

/// Finished inference output.
#[derive(Debug)]
pub struct TranscriptionOutput {
    pub text: String,
    /// ISO 639-1 code, detected or caller-forced. `"unknown"` when detection
    /// produced nothing usable.
    pub language: String,
    pub elapsed: Duration,
}

/// Registry of loaded whisper models plus the inference entry point.
///
/// Models load lazily on first use and stay resident afterwards. Cloning the
/// engine shares the registry. [`transcribe`](Self::transcribe) blocks the
/// calling thread for the whole inference run; callers on the async runtime
/// must wrap it in `spawn_blocking`.
#[derive(Clone)]
pub struct WhisperEngine {
    models_dir: PathBuf,
    models: Arc<RwLock<HashMap<String, Arc<WhisperModel>>>>,
}

impl WhisperEngine {
    pub fn new(models_dir: PathBuf) -> Self {
        Self {
            models_dir,
            models: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Loads a model eagerly. Called at startup for the default model so a
    /// missing file fails the process instead of the first job.
    pub fn preload(&self, size: &str) -> Result<(), EngineError> {
        self.model(size).map(|_| ())
    }

    fn model(&self, size: &str) -> Result<Arc<WhisperModel>, EngineError> {
        if !MODEL_SIZES.contains(&size) {
            return Err(EngineError::UnknownModel(size.to_string()));
        }

        {
            let models = self
                .models
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(model) = models.get(size) {
                return Ok(model.clone());
            }
        }

        let mut models = self
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Another thread may have loaded it while we waited for the lock.
        if let Some(model) = models.get(size) {
            return Ok(model.clone());
        }

        let path = self.models_dir.join(format!("ggml-{size}.bin"));
        let model = Arc::new(WhisperModel::load(&path)?);
        models.insert(size.to_string(), model.clone());
        Ok(model)
    }

    /// Runs whisper over mono 16 kHz samples.
    ///
    /// `language: None` lets the model detect the language; `Some` forces it.
    /// `translate` produces English output regardless of the input language.
    pub fn transcribe(
        &self,
        model_size: &str,
        samples: &[f32],
        language: Option<&str>,
        translate: bool,
    ) -> Result<TranscriptionOutput, EngineError> {
        let model = self.model(model_size)?;
        let mut state = model
            .context()
            .create_state()
            .map_err(|err| EngineError::State(err.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: BEAM_SIZE as std::os::raw::c_int,
            patience: -1.0,
        });
        params.set_language(language);
        params.set_translate(translate);
        params.set_no_speech_thold(0.6);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let started = Instant::now();
        state
            .full(params, samples)
            .map_err(|err| EngineError::Inference(err.to_string()))?;
        let elapsed = started.elapsed();

        let mut pieces: Vec<String> = Vec::with_capacity(state.full_n_segments() as usize);
        for segment in state.as_iter() {
            let text = segment.to_string();
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                pieces.push(trimmed.to_string());
            }
        }
        let text = pieces.join(" ");

        let language = match language {
            Some(forced) => forced.to_string(),
            None => {
                let id = state.full_lang_id_from_state();
                whisper_rs::get_lang_str(id).unwrap_or("unknown").to_string()
            }
        };

        tracing::debug!(
            "🧠 Inference done: {} segments, language '{}', {:.1}s",
            state.full_n_segments(),
            language,
            elapsed.as_secs_f64()
        );

        Ok(TranscriptionOutput {
            text,
            language,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_size_is_rejected_without_touching_disk() {
        let engine = WhisperEngine::new(PathBuf::from("/nonexistent"));
        let err = engine.preload("gigantic").unwrap_err();
        assert!(matches!(err, EngineError::UnknownModel(_)));
    }

    #[test]
    fn missing_model_file_reports_its_path() {
        let engine = WhisperEngine::new(PathBuf::from("/nonexistent"));
        let err = engine.preload("base").unwrap_err();
        match err {
            EngineError::Model(ModelError::FileNotFound(path)) => {
                assert!(path.contains("ggml-base.bin"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
