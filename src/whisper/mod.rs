mod engine;
mod model;

pub use engine::{EngineError, TranscriptionOutput, WhisperEngine};
pub use model::{ModelError, WhisperModel};
