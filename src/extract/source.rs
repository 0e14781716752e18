use std::path::{Path, PathBuf};

/// Video container formats accepted for extraction.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "wmv", "webm"];

/// What to extract audio from. Immutable once created and never persisted:
/// it exists only for the duration of one extraction call (plus the cache
/// window, where only its [`identity`](Self::identity) string survives).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceReference {
    /// A remote video stream reachable over HTTP(S).
    RemoteUrl(String),
    /// A video file already on the local filesystem (e.g. a staged upload).
    LocalFile(PathBuf),
}

impl SourceReference {
    /// Exact-match cache key: the literal URL or path string.
    /// No normalization, so `./a.mp4` and `a.mp4` are distinct sources.
    pub fn identity(&self) -> String {
        match self {
            Self::RemoteUrl(url) => url.clone(),
            Self::LocalFile(path) => path.display().to_string(),
        }
    }

    /// Lowercased extension of the source, if it has one.
    pub fn extension(&self) -> Option<String> {
        match self {
            Self::LocalFile(path) => extension_of(path),
            Self::RemoteUrl(url) => {
                // Extension of the last path segment, ignoring query string.
                let path = url.split(['?', '#']).next().unwrap_or(url);
                extension_of(Path::new(path.rsplit('/').next().unwrap_or("")))
            }
        }
    }

    /// Stem used to name the extracted artifact (`{stem}.wav`).
    pub fn artifact_stem(&self) -> String {
        let stem = match self {
            Self::LocalFile(path) => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("")
                .to_string(),
            Self::RemoteUrl(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                let segment = path.rsplit('/').next().unwrap_or("");
                segment
                    .rsplit_once('.')
                    .map(|(s, _)| s)
                    .unwrap_or(segment)
                    .to_string()
            }
        };

        if stem.is_empty() {
            "extracted-audio".to_string()
        } else {
            stem
        }
    }
}

impl std::fmt::Display for SourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RemoteUrl(url) => write!(f, "url:{url}"),
            Self::LocalFile(path) => write!(f, "file:{}", path.display()),
        }
    }
}

/// `true` if `ext` (lowercase) is an accepted video container format.
pub fn is_allowed_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_the_literal_string() {
        let url = SourceReference::RemoteUrl("https://example.com/v.mp4?t=1".into());
        assert_eq!(url.identity(), "https://example.com/v.mp4?t=1");

        let file = SourceReference::LocalFile(PathBuf::from("./videos/v.mp4"));
        assert_eq!(file.identity(), "./videos/v.mp4");

        // No fuzzy matching: equivalent paths stay distinct keys.
        let plain = SourceReference::LocalFile(PathBuf::from("videos/v.mp4"));
        assert_ne!(file.identity(), plain.identity());
    }

    #[test]
    fn extension_ignores_query_and_case() {
        let url = SourceReference::RemoteUrl("https://example.com/clip.MP4?sig=abc".into());
        assert_eq!(url.extension().as_deref(), Some("mp4"));

        let file = SourceReference::LocalFile(PathBuf::from("/tmp/video.MKV"));
        assert_eq!(file.extension().as_deref(), Some("mkv"));

        let bare = SourceReference::RemoteUrl("https://example.com/stream".into());
        assert_eq!(bare.extension(), None);
    }

    #[test]
    fn allow_list_covers_known_containers_only() {
        for ext in ["mp4", "mov", "avi", "mkv", "wmv", "webm"] {
            assert!(is_allowed_extension(ext), "{ext} should be allowed");
        }
        for ext in ["exe", "mp3", "wav", "txt", ""] {
            assert!(!is_allowed_extension(ext), "{ext} should be rejected");
        }
    }

    #[test]
    fn artifact_stem_falls_back_when_unnameable() {
        let file = SourceReference::LocalFile(PathBuf::from("/tmp/meeting.mp4"));
        assert_eq!(file.artifact_stem(), "meeting");

        let url = SourceReference::RemoteUrl("https://example.com/talks/keynote.mp4".into());
        assert_eq!(url.artifact_stem(), "keynote");

        let bare = SourceReference::RemoteUrl("https://example.com/".into());
        assert_eq!(bare.artifact_stem(), "extracted-audio");
    }
}
