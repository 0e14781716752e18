mod decoder;
mod resampler;

pub use decoder::DecodedAudio;
pub use resampler::TARGET_SAMPLE_RATE;

#[derive(Debug)]
pub enum AudioError {
    /// The audio is longer than the configured ceiling.
    TooLong {
        duration_secs: f64,
        limit_secs: f64,
    },
    /// The byte stream could not be decoded as audio.
    Decode(String),
    /// The container held no decodable audio track.
    NoAudioTrack,
    /// Sample-rate conversion failed.
    Resample(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLong {
                duration_secs,
                limit_secs,
            } => write!(
                f,
                "audio is {duration_secs:.1}s, limit is {limit_secs:.1}s"
            ),
            Self::Decode(msg) => write!(f, "audio decode failed: {msg}"),
            Self::NoAudioTrack => write!(f, "no audio track found"),
            Self::Resample(msg) => write!(f, "resampling failed: {msg}"),
        }
    }
}

impl std::error::Error for AudioError {}

/// Ceilings applied to decoded audio before inference.
#[derive(Debug, Clone, Copy)]
pub struct AudioLimits {
    pub max_duration_secs: f64,
}

/// Audio in the exact shape whisper wants: mono f32 at 16 kHz.
#[derive(Debug)]
pub struct PreparedAudio {
    pub samples: Vec<f32>,
    pub duration_secs: f64,
}

/// Decodes a WAV byte stream and converts it to mono 16 kHz f32.
///
/// The duration ceiling is checked on the decoded length, before the (much
/// more expensive) inference step gets a chance to run.
pub fn prepare(wav: &[u8], limits: AudioLimits) -> Result<PreparedAudio, AudioError> {
    let decoded = decoder::decode(wav)?;
    let duration_secs = decoded.duration_secs();

    if duration_secs > limits.max_duration_secs {
        return Err(AudioError::TooLong {
            duration_secs,
            limit_secs: limits.max_duration_secs,
        });
    }

    let samples = resampler::to_mono_16k(&decoded)?;
    Ok(PreparedAudio {
        samples,
        duration_secs,
    })
}
