use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::decoder::DecodedAudio;
use super::AudioError;

/// Sample rate whisper models are trained on.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

const CHUNK_FRAMES: usize = 1024;

/// Converts decoded audio to mono at [`TARGET_SAMPLE_RATE`].
pub fn to_mono_16k(audio: &DecodedAudio) -> Result<Vec<f32>, AudioError> {
    let mono = downmix(&audio.samples, audio.channels);
    if audio.sample_rate == TARGET_SAMPLE_RATE {
        return Ok(mono);
    }
    resample(&mono, audio.sample_rate)
}

/// Interleaved multi-channel to mono by averaging each frame.
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample(mono: &[f32], from_rate: u32) -> Result<Vec<f32>, AudioError> {
    let ratio = f64::from(TARGET_SAMPLE_RATE) / f64::from(from_rate);
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_FRAMES, 1)
        .map_err(|err| AudioError::Resample(err.to_string()))?;

    let mut output = Vec::with_capacity((mono.len() as f64 * ratio) as usize + CHUNK_FRAMES);
    let mut pos = 0;

    loop {
        let needed = resampler.input_frames_next();
        if pos + needed > mono.len() {
            break;
        }
        let frames = resampler
            .process(&[&mono[pos..pos + needed]], None)
            .map_err(|err| AudioError::Resample(err.to_string()))?;
        output.extend_from_slice(&frames[0]);
        pos += needed;
    }

    // Tail shorter than a full chunk, then a final flush of buffered frames.
    if pos < mono.len() {
        let frames = resampler
            .process_partial(Some(&[&mono[pos..]]), None)
            .map_err(|err| AudioError::Resample(err.to_string()))?;
        output.extend_from_slice(&frames[0]);
    }
    let frames = resampler
        .process_partial::<&[f32]>(None, None)
        .map_err(|err| AudioError::Resample(err.to_string()))?;
    output.extend_from_slice(&frames[0]);

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_frames() {
        // Stereo frames: (1, 0), (0.5, 0.5), (-1, 1).
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        let mono = downmix(&stereo, 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn mono_input_passes_through_downmix() {
        let samples = [0.1, 0.2, 0.3];
        assert_eq!(downmix(&samples, 1), samples.to_vec());
    }

    #[test]
    fn target_rate_skips_resampling() {
        let audio = DecodedAudio {
            samples: vec![0.0; 16_000],
            sample_rate: TARGET_SAMPLE_RATE,
            channels: 1,
        };
        let out = to_mono_16k(&audio).unwrap();
        assert_eq!(out.len(), 16_000);
    }

    #[test]
    fn resampling_halves_the_frame_count_from_32k() {
        let audio = DecodedAudio {
            samples: vec![0.0; 32_000],
            sample_rate: 32_000,
            channels: 1,
        };
        let out = to_mono_16k(&audio).unwrap();
        // One second in, roughly one second out. Sinc filters shave edges.
        let expected = 16_000_f64;
        assert!((out.len() as f64 - expected).abs() < expected * 0.05);
    }
}
