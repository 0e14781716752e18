mod cache;
mod extractor;
mod source;

pub use cache::ExtractionCache;
pub use extractor::{Extract, ExtractError, ExtractLimits, MediaExtractor};
pub use source::{SourceReference, VIDEO_EXTENSIONS};

/// An extracted audio track, held fully in memory.
///
/// Produced by [`MediaExtractor::extract`]; every temporary file involved in
/// producing it is gone by the time a value of this type exists. Uploading the
/// bytes to the object store is the caller's next step, and the cache may keep
/// a shared handle for the TTL window.
#[derive(Debug)]
pub struct AudioArtifact {
    /// Logical filename, always `.wav` (e.g. `meeting.wav`).
    pub filename: String,
    /// Complete WAV file: mono, 16 kHz, 16-bit PCM.
    pub wav: Vec<u8>,
    /// Audio duration in seconds, read from the WAV header.
    pub duration_secs: f64,
}
