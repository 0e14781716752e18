mod job;
mod record;

pub use job::{JobPayload, JobStatus, TranscribeOptions};
pub use record::TranscriptionRecord;
