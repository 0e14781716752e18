use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;

/// Bucket holding extracted audio artifacts.
pub const AUDIO_BUCKET: &str = "audio-files";
/// Bucket holding finished transcript texts.
pub const TRANSCRIPT_BUCKET: &str = "transcriptions";

#[derive(Debug)]
pub enum StorageError {
    /// The requested object does not exist.
    NotFound(String),
    /// Any other request failure (connectivity, auth, service error).
    Request(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "object not found: {what}"),
            Self::Request(msg) => write!(f, "storage request failed: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Location of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRef {
    pub bucket: String,
    pub key: String,
}

impl std::fmt::Display for StorageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Object key for a user-owned file. Keys are namespaced per user so two
/// users uploading `meeting.wav` never collide.
pub fn object_key(user_id: i64, filename: &str) -> String {
    format!("{user_id}/{filename}")
}

/// S3-compatible object store client. Works against MinIO and AWS alike;
/// path-style addressing keeps single-endpoint MinIO deployments happy.
#[derive(Clone)]
pub struct ObjectStore {
    client: aws_sdk_s3::Client,
}

impl ObjectStore {
    pub fn new(endpoint: &str, region: &str, access_key: &str, secret_key: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }

    /// Creates the audio and transcript buckets if they do not exist yet.
    pub async fn ensure_buckets(&self) -> Result<(), StorageError> {
        for bucket in [AUDIO_BUCKET, TRANSCRIPT_BUCKET] {
            match self.client.create_bucket().bucket(bucket).send().await {
                Ok(_) => tracing::info!("🪣 Created bucket '{bucket}'"),
                Err(err) => {
                    let msg = format!("{err:?}");
                    // Already-owned buckets are fine; anything else is fatal.
                    if msg.contains("BucketAlreadyOwnedByYou") || msg.contains("BucketAlreadyExists")
                    {
                        tracing::debug!("🪣 Bucket '{bucket}' already exists");
                    } else {
                        return Err(StorageError::Request(format!(
                            "create bucket '{bucket}': {err}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Uploads `bytes` and returns where they landed. Overwrites silently:
    /// re-uploading the same key is how idempotent retries stay cheap.
    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<StorageRef, StorageError> {
        let len = bytes.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| StorageError::Request(format!("put {bucket}/{key}: {err}")))?;

        tracing::debug!("⬆️ Stored {len} bytes at {bucket}/{key}");
        Ok(StorageRef {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Downloads an object in full.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let msg = format!("{err:?}");
                if msg.contains("NoSuchKey") {
                    StorageError::NotFound(format!("{bucket}/{key}"))
                } else {
                    StorageError::Request(format!("get {bucket}/{key}: {err}"))
                }
            })?;

        let bytes = object
            .body
            .collect()
            .await
            .map_err(|err| StorageError::Request(format!("read {bucket}/{key}: {err}")))?;
        Ok(bytes.into_bytes().to_vec())
    }
}
