//! Ingestion job ledger models.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle state of an ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("unknown job status: {}", s)),
        }
    }
}

/// One PDF's extraction + ingestion, as persisted in the job ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: String,
    pub pdf_path: PathBuf,
    pub text_path: PathBuf,
    pub collection: String,
    pub chunk_size: usize,
    pub status: JobStatus,
    pub attempts: u32,
    pub chunks_stored: u64,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Notification broadcast by the runner when a job changes state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        id: String,
        attempt: u32,
    },
    Succeeded {
        id: String,
        source: String,
        chunks_stored: u64,
        chunks_skipped: u64,
    },
    Failed {
        id: String,
        attempts: u32,
        error: String,
    },
    /// The job was already finished when the worker reached it.
    Skipped {
        id: String,
        status: JobStatus,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Started { id, .. }
            | JobEvent::Succeeded { id, .. }
            | JobEvent::Failed { id, .. }
            | JobEvent::Skipped { id, .. } => id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Started { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_round_trip_through_str() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_job_event_accessors() {
        let event = JobEvent::Failed {
            id: "j1".into(),
            attempts: 3,
            error: "store unavailable".into(),
        };
        assert_eq!(event.job_id(), "j1");
        assert!(event.is_terminal());
        assert!(!JobEvent::Started { id: "j1".into(), attempt: 1 }.is_terminal());

        let skipped = JobEvent::Skipped {
            id: "j2".into(),
            status: JobStatus::Succeeded,
        };
        assert_eq!(skipped.job_id(), "j2");
        assert!(skipped.is_terminal());
    }
}
