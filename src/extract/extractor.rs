use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::config::Config;
use crate::report::{ErrorKind, Reporter};

use super::source::{is_allowed_extension, SourceReference};
use super::AudioArtifact;

/// Seam between the cache and the extractor. The cache only needs "produce
/// an artifact for this source"; tests substitute counting or failing stubs.
pub trait Extract: Send + Sync {
    fn extract<'a>(
        &'a self,
        source: &'a SourceReference,
        reporter: &'a Reporter,
    ) -> BoxFuture<'a, Result<AudioArtifact, ExtractError>>;
}

// ── Errors ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ExtractError {
    /// The referenced local file does not exist or is not readable.
    SourceMissing(String),
    /// The source is not a recognized video container format.
    UnsupportedFormat(String),
    /// The remote reference is not a usable http(s) URL.
    InvalidUrl(String),
    /// The source exceeds the configured size ceiling.
    TooLarge { size_bytes: u64, limit_bytes: u64 },
    /// The remote download failed (connection, HTTP status, truncated body).
    Download(String),
    /// ffmpeg could not be launched or exited with a failure status.
    Toolkit(String),
    /// ffmpeg ran past the configured deadline and was killed.
    Timeout(u64),
    /// ffmpeg reported success but produced no usable audio.
    EmptyOutput,
    Io(std::io::Error),
}

impl ExtractError {
    /// Which failure class this error reports as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceMissing(_)
            | Self::UnsupportedFormat(_)
            | Self::InvalidUrl(_)
            | Self::TooLarge { .. } => ErrorKind::InputValidation,
            _ => ErrorKind::Extraction,
        }
    }
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceMissing(path) => write!(f, "source not found: {path}"),
            Self::UnsupportedFormat(what) => write!(f, "unsupported video format: {what}"),
            Self::InvalidUrl(url) => write!(f, "invalid source url: {url}"),
            Self::TooLarge {
                size_bytes,
                limit_bytes,
            } => write!(
                f,
                "source is {size_bytes} bytes, limit is {limit_bytes} bytes"
            ),
            Self::Download(msg) => write!(f, "download failed: {msg}"),
            Self::Toolkit(msg) => write!(f, "ffmpeg failed: {msg}"),
            Self::Timeout(secs) => write!(f, "extraction exceeded {secs}s and was killed"),
            Self::EmptyOutput => write!(f, "extraction produced no audio"),
            Self::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<std::io::Error> for ExtractError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

// ── Extractor ──────────────────────────────────────────────────────────────────

/// Size and time ceilings enforced on every extraction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractLimits {
    /// Maximum size of the input video, in bytes. Checked before ffmpeg runs
    /// for local files, and enforced mid-stream for remote downloads.
    pub max_source_bytes: u64,
    /// Hard deadline on the ffmpeg run.
    pub timeout: Duration,
}

/// Either the source file itself or a temporary download of it.
/// Dropping the `Downloaded` variant deletes the temp file.
enum StagedInput {
    Local(PathBuf),
    Downloaded(NamedTempFile),
}

impl StagedInput {
    fn path(&self) -> &Path {
        match self {
            Self::Local(path) => path,
            Self::Downloaded(tmp) => tmp.path(),
        }
    }
}

/// Turns a video source into an in-memory mono 16 kHz WAV by shelling out to
/// ffmpeg. Stateless apart from configuration; safe to share and call
/// concurrently, though the [`ExtractionCache`](super::ExtractionCache)
/// serializes calls in practice.
#[derive(Debug, Clone)]
pub struct MediaExtractor {
    limits: ExtractLimits,
    tmp_dir: PathBuf,
    http: reqwest::Client,
}

impl Extract for MediaExtractor {
    fn extract<'a>(
        &'a self,
        source: &'a SourceReference,
        reporter: &'a Reporter,
    ) -> BoxFuture<'a, Result<AudioArtifact, ExtractError>> {
        MediaExtractor::extract(self, source, reporter).boxed()
    }
}

impl MediaExtractor {
    pub fn new(limits: ExtractLimits, tmp_dir: PathBuf) -> Result<Self, ExtractError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| ExtractError::Download(err.to_string()))?;

        Ok(Self {
            limits,
            tmp_dir,
            http,
        })
    }

    /// Builds an extractor from the loaded configuration: size ceiling from
    /// `MAX_VIDEO_SIZE_MB`, deadline from `EXTRACT_TIMEOUT_SEC`, scratch
    /// space from `TMP_DIR`.
    pub fn from_config(config: &Config) -> Result<Self, ExtractError> {
        let limits = ExtractLimits {
            max_source_bytes: config.max_video_size_bytes(),
            timeout: Duration::from_secs(config.extract_timeout_sec),
        };
        Self::new(limits, config.tmp_dir.clone())
    }

    /// Extracts the audio track of `source` as a mono 16 kHz 16-bit WAV.
    ///
    /// Every temporary file this creates (downloaded input, ffmpeg output) is
    /// deleted before the call returns, on success and on every failure path.
    /// The returned artifact lives entirely in memory.
    pub async fn extract(
        &self,
        source: &SourceReference,
        reporter: &Reporter,
    ) -> Result<AudioArtifact, ExtractError> {
        reporter.progress(0.05, "preparing");
        self.validate(source)?;
        let staged = self.stage(source).await?;

        reporter.progress(0.25, "extracting");
        let wav = self.run_ffmpeg(staged.path()).await?;
        // Input temp file (if any) is gone before the artifact exists.
        drop(staged);

        reporter.progress(0.75, "finalizing");
        let duration_secs = wav_duration_secs(&wav).ok_or(ExtractError::EmptyOutput)?;
        if duration_secs <= 0.0 {
            return Err(ExtractError::EmptyOutput);
        }

        let artifact = AudioArtifact {
            filename: format!("{}.wav", source.artifact_stem()),
            wav,
            duration_secs,
        };

        tracing::info!(
            "🎬 Extracted '{}' ({:.1}s of audio, {} bytes)",
            artifact.filename,
            artifact.duration_secs,
            artifact.wav.len()
        );
        reporter.progress(1.0, "finalizing");
        Ok(artifact)
    }

    /// Rejects malformed references before any network or subprocess work.
    fn validate(&self, source: &SourceReference) -> Result<(), ExtractError> {
        match source {
            SourceReference::LocalFile(_) => match source.extension() {
                Some(ext) if is_allowed_extension(&ext) => Ok(()),
                Some(ext) => Err(ExtractError::UnsupportedFormat(ext)),
                None => Err(ExtractError::UnsupportedFormat(
                    "file has no extension".to_string(),
                )),
            },
            SourceReference::RemoteUrl(url) => {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ExtractError::InvalidUrl(url.clone()));
                }
                // A URL without an extension may still serve playable video;
                // only a recognizably wrong extension is rejected up front.
                match source.extension() {
                    Some(ext) if !is_allowed_extension(&ext) => {
                        Err(ExtractError::UnsupportedFormat(ext))
                    }
                    _ => Ok(()),
                }
            }
        }
    }

    /// Produces a local path for ffmpeg to read: the file itself, or a
    /// size-capped download into the scratch directory.
    async fn stage(&self, source: &SourceReference) -> Result<StagedInput, ExtractError> {
        match source {
            SourceReference::LocalFile(path) => {
                let meta = tokio::fs::metadata(path)
                    .await
                    .map_err(|_| ExtractError::SourceMissing(path.display().to_string()))?;
                if meta.len() > self.limits.max_source_bytes {
                    return Err(ExtractError::TooLarge {
                        size_bytes: meta.len(),
                        limit_bytes: self.limits.max_source_bytes,
                    });
                }
                Ok(StagedInput::Local(path.clone()))
            }
            SourceReference::RemoteUrl(url) => {
                let tmp = self.download(url).await?;
                Ok(StagedInput::Downloaded(tmp))
            }
        }
    }

    async fn download(&self, url: &str) -> Result<NamedTempFile, ExtractError> {
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| ExtractError::Download(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractError::Download(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }
        if let Some(len) = response.content_length() {
            if len > self.limits.max_source_bytes {
                return Err(ExtractError::TooLarge {
                    size_bytes: len,
                    limit_bytes: self.limits.max_source_bytes,
                });
            }
        }

        let mut tmp = tempfile::Builder::new()
            .prefix("source-")
            .tempfile_in(&self.tmp_dir)?;

        // Content-Length is advisory; the cap is enforced on actual bytes.
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| ExtractError::Download(err.to_string()))?
        {
            written += chunk.len() as u64;
            if written > self.limits.max_source_bytes {
                return Err(ExtractError::TooLarge {
                    size_bytes: written,
                    limit_bytes: self.limits.max_source_bytes,
                });
            }
            tmp.write_all(&chunk)?;
        }
        tmp.flush()?;

        tracing::debug!("⬇️ Downloaded {written} bytes from {url}");
        Ok(tmp)
    }

    /// Runs ffmpeg against `input`, returning the produced WAV bytes. The
    /// output file is a temp file deleted when this function returns.
    async fn run_ffmpeg(&self, input: &Path) -> Result<Vec<u8>, ExtractError> {
        let out = tempfile::Builder::new()
            .prefix("audio-")
            .suffix(".wav")
            .tempfile_in(&self.tmp_dir)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
            .arg(out.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // The child must not outlive a cancelled deadline.
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.limits.timeout, cmd.output()).await {
            Err(_) => return Err(ExtractError::Timeout(self.limits.timeout.as_secs())),
            Ok(Err(err)) => {
                return Err(ExtractError::Toolkit(format!(
                    "could not launch ffmpeg: {err}"
                )))
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!("❌ ffmpeg exited with {}: {}", output.status, stderr.trim());
            let summary = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no diagnostic output")
                .trim()
                .to_string();
            return Err(ExtractError::Toolkit(summary));
        }

        let wav = tokio::fs::read(out.path()).await?;
        if wav.len() <= WAV_HEADER_LEN {
            return Err(ExtractError::EmptyOutput);
        }
        Ok(wav)
    }
}

// ── WAV header parsing ─────────────────────────────────────────────────────────

const WAV_HEADER_LEN: usize = 44;

/// Audio duration of a RIFF/WAVE byte stream, from its `fmt ` byte rate and
/// `data` chunk size. `None` when the stream is not a well-formed WAV.
fn wav_duration_secs(bytes: &[u8]) -> Option<f64> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let mut byte_rate: Option<u32> = None;
    let mut data_len: Option<u32> = None;

    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().ok()?);
        let body = offset + 8;

        match id {
            b"fmt " if body + 12 <= bytes.len() => {
                byte_rate = Some(u32::from_le_bytes(
                    bytes[body + 8..body + 12].try_into().ok()?,
                ));
            }
            b"data" => data_len = Some(size),
            _ => {}
        }

        // Chunks are word-aligned.
        offset = body + size as usize + (size as usize & 1);
    }

    match (byte_rate, data_len) {
        (Some(rate), Some(len)) if rate > 0 => Some(f64::from(len) / f64::from(rate)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(max_source_bytes: u64) -> (MediaExtractor, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let limits = ExtractLimits {
            max_source_bytes,
            timeout: Duration::from_secs(5),
        };
        let ex = MediaExtractor::new(limits, dir.path().to_path_buf()).unwrap();
        (ex, dir)
    }

    /// Minimal playable WAV: 44-byte header plus `samples` of 16-bit mono PCM.
    fn make_wav(samples: u32, sample_rate: u32) -> Vec<u8> {
        let data_len = samples * 2;
        let byte_rate = sample_rate * 2;
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data_len).to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
        wav.extend_from_slice(&1u16.to_le_bytes()); // mono
        wav.extend_from_slice(&sample_rate.to_le_bytes());
        wav.extend_from_slice(&byte_rate.to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes()); // block align
        wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&data_len.to_le_bytes());
        wav.extend(std::iter::repeat(0u8).take(data_len as usize));
        wav
    }

    #[tokio::test]
    async fn missing_local_file_is_rejected() {
        let (ex, dir) = extractor(1024);
        let source = SourceReference::LocalFile(dir.path().join("absent.mp4"));
        let err = ex.extract(&source, &Reporter::noop()).await.unwrap_err();
        assert!(matches!(err, ExtractError::SourceMissing(_)));
        assert_eq!(err.kind(), ErrorKind::InputValidation);
    }

    #[tokio::test]
    async fn oversized_local_file_is_rejected_before_ffmpeg() {
        let (ex, dir) = extractor(16);
        let path = dir.path().join("big.mp4");
        std::fs::write(&path, [0u8; 64]).unwrap();

        let err = ex
            .extract(&SourceReference::LocalFile(path), &Reporter::noop())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractError::TooLarge {
                size_bytes: 64,
                limit_bytes: 16
            }
        ));
        assert_eq!(err.kind(), ErrorKind::InputValidation);
    }

    #[tokio::test]
    async fn from_config_converts_megabytes_to_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            rabbitmq_url: String::new(),
            workers_count: 1,
            whisper_model: "base".into(),
            models_dir: PathBuf::from("/app/models"),
            max_video_size_mb: 1,
            extract_timeout_sec: 5,
            extract_cache_ttl_sec: 3_600,
            tmp_dir: dir.path().to_path_buf(),
            max_audio_duration_sec: 3_600.0,
            s3_endpoint: String::new(),
            s3_region: String::new(),
            s3_access_key: String::new(),
            s3_secret_key: String::new(),
            database_url: String::new(),
        };
        let ex = MediaExtractor::from_config(&config).unwrap();

        // One byte over the 1 MB ceiling.
        let path = dir.path().join("over.mp4");
        std::fs::write(&path, vec![0u8; 1_048_577]).unwrap();
        let err = ex
            .extract(&SourceReference::LocalFile(path), &Reporter::noop())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractError::TooLarge {
                size_bytes: 1_048_577,
                limit_bytes: 1_048_576
            }
        ));
    }

    #[tokio::test]
    async fn non_http_url_is_rejected() {
        let (ex, _dir) = extractor(1024);
        let source = SourceReference::RemoteUrl("ftp://example.com/v.mp4".into());
        let err = ex.extract(&source, &Reporter::noop()).await.unwrap_err();
        assert!(matches!(err, ExtractError::InvalidUrl(_)));
        assert_eq!(err.kind(), ErrorKind::InputValidation);
    }

    #[tokio::test]
    async fn unknown_extension_is_rejected() {
        let (ex, dir) = extractor(1024);
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, [0u8; 4]).unwrap();

        let err = ex
            .extract(&SourceReference::LocalFile(path), &Reporter::noop())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn wav_duration_reads_header() {
        // 16000 samples at 16 kHz is exactly one second.
        let wav = make_wav(16_000, 16_000);
        let duration = wav_duration_secs(&wav).unwrap();
        assert!((duration - 1.0).abs() < 1e-9);

        let half = make_wav(8_000, 16_000);
        assert!((wav_duration_secs(&half).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn wav_duration_rejects_garbage() {
        assert!(wav_duration_secs(b"not a wav at all").is_none());
        assert!(wav_duration_secs(&[]).is_none());
        // Header claims RIFF but has no chunks.
        assert!(wav_duration_secs(b"RIFF\x00\x00\x00\x00WAVE").is_none());
    }
}
