//! Transcode job state.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle of a transcode job. A job reaches a terminal state exactly
/// once; no progress updates follow a terminal transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    FailedFallback,
    FailedDropped,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::FailedFallback => "failed-fallback",
            JobStatus::FailedDropped => "failed-dropped",
        }
    }
}

/// One transcode job: staged source file in, final file out.
#[derive(Debug)]
pub struct TranscodeJob {
    pub id: Uuid,
    /// Staged temp file. Owned by the runner until a terminal state.
    pub source: PathBuf,
    /// Final file slot within the videos directory.
    pub dest: PathBuf,
    /// Filename component of `dest`, recorded against the asset on success.
    pub dest_filename: String,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
}

impl TranscodeJob {
    pub fn new(source: PathBuf, dest: PathBuf, dest_filename: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            dest,
            dest_filename,
            status: JobStatus::Queued,
            started_at: None,
        }
    }
}

/// Terminal result of one job. `FellBack` means the original staged bytes
/// were renamed into the final slot after an encode failure or timeout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded { filename: String },
    FellBack { filename: String },
    Dropped { reason: String },
}
