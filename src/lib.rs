//! TranscriptFlow core pipeline.
//!
//! Turns a video source (remote URL or local file) into a durable transcript:
//!
//! ```text
//! caller ──► extract (ffmpeg, cached) ──► object store (audio-files)
//!        ──► dispatcher (RabbitMQ)     ──► worker pool
//! worker ──► object store (download)   ──► whisper.cpp
//!        ──► object store (transcripts)──► Postgres record
//! caller ──► poll job status / fetch record
//! ```
//!
//! The front-end collaborator embeds [`ingest::IngestService`] (built from
//! configuration via [`app::build_ingest`]) for submission and
//! [`records::RecordStore`] for status polling; the worker daemon binary
//! (`app::run`) consumes jobs from the broker.

pub mod app;
pub mod audio;
pub mod config;
pub mod extract;
pub mod ingest;
pub mod messaging;
pub mod metrics;
pub mod model;
pub mod records;
pub mod report;
pub mod shutdown;
pub mod storage;
pub mod whisper;
pub mod worker;
