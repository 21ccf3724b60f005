//! Background ingestion jobs with tenant-scoped status lookups.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use nexora_memory::TenantId;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::RagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: Uuid,
    pub label: String,
    pub state: JobState,
    pub chunks_stored: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

struct Entry {
    tenant: TenantId,
    status: JobStatus,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Jobs {
    entries: HashMap<Uuid, Entry>,
    finished: VecDeque<Uuid>,
}

#[derive(Clone)]
pub struct JobTracker {
    jobs: Arc<Mutex<Jobs>>,
    max_retained: usize,
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("max_retained", &self.max_retained)
            .finish_non_exhaustive()
    }
}

impl JobTracker {
    #[must_use]
    pub fn new(max_retained: usize) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Jobs::default())),
            max_retained: max_retained.max(1),
        }
    }

    fn with_jobs<T>(&self, f: impl FnOnce(&mut Jobs) -> T) -> T {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut jobs)
    }

    /// Run `work` on the runtime and return its id. The future resolves to the number
    /// of chunks stored.
    pub fn submit<F>(&self, tenant: TenantId, label: impl Into<String>, work: F) -> Uuid
    where
        F: Future<Output = Result<usize, RagError>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let label = label.into();
        tracing::info!(tenant = %tenant, job = %id, label = %label, "ingestion job submitted");

        self.with_jobs(|jobs| {
            jobs.entries.insert(
                id,
                Entry {
                    tenant: tenant.clone(),
                    status: JobStatus {
                        id,
                        label,
                        state: JobState::Queued,
                        chunks_stored: 0,
                        error: None,
                        submitted_at: Utc::now(),
                        finished_at: None,
                    },
                    cancel: cancel.clone(),
                },
            );
        });

        let tracker = self.clone();
        tokio::spawn(async move {
            tracker.update(id, |status| status.state = JobState::Running);
            let outcome = tokio::select! {
                () = cancel.cancelled() => None,
                result = work => Some(result),
            };
            match outcome {
                Some(Ok(stored)) => {
                    tracing::info!(tenant = %tenant, job = %id, chunks = stored, "ingestion job completed");
                    tracker.finish(id, JobState::Completed, stored, None);
                }
                Some(Err(e)) => {
                    tracing::warn!(tenant = %tenant, job = %id, kind = %e.kind(), "ingestion job failed: {e}");
                    tracker.finish(id, JobState::Failed, 0, Some(e.user_message()));
                }
                None => {
                    tracing::info!(tenant = %tenant, job = %id, "ingestion job cancelled");
                    tracker.finish(id, JobState::Cancelled, 0, None);
                }
            }
        });

        id
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut JobStatus)) {
        self.with_jobs(|jobs| {
            if let Some(entry) = jobs.entries.get_mut(&id)
                && !entry.status.state.is_finished()
            {
                f(&mut entry.status);
            }
        });
    }

    fn finish(&self, id: Uuid, state: JobState, chunks_stored: usize, error: Option<String>) {
        let max_retained = self.max_retained;
        self.with_jobs(|jobs| {
            let Some(entry) = jobs.entries.get_mut(&id) else {
                return;
            };
            entry.status.state = state;
            entry.status.chunks_stored = chunks_stored;
            entry.status.error = error;
            entry.status.finished_at = Some(Utc::now());
            jobs.finished.push_back(id);
            while jobs.finished.len() > max_retained {
                if let Some(evicted) = jobs.finished.pop_front() {
                    jobs.entries.remove(&evicted);
                }
            }
        });
    }

    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] for unknown jobs and jobs of other tenants.
    pub fn get_status(&self, tenant: &TenantId, id: Uuid) -> Result<JobStatus, RagError> {
        self.with_jobs(|jobs| {
            jobs.entries
                .get(&id)
                .filter(|entry| entry.tenant == *tenant)
                .map(|entry| entry.status.clone())
                .ok_or_else(|| RagError::NotFound(format!("job {id}")))
        })
    }

    /// Request cancellation. Returns `false` if the job had already finished.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] for unknown jobs and jobs of other tenants.
    pub fn cancel(&self, tenant: &TenantId, id: Uuid) -> Result<bool, RagError> {
        self.with_jobs(|jobs| {
            let entry = jobs
                .entries
                .get(&id)
                .filter(|entry| entry.tenant == *tenant)
                .ok_or_else(|| RagError::NotFound(format!("job {id}")))?;
            if entry.status.state.is_finished() {
                return Ok(false);
            }
            entry.cancel.cancel();
            Ok(true)
        })
    }

    /// Cancel every unfinished job, e.g. on shutdown.
    pub fn cancel_all(&self) {
        self.with_jobs(|jobs| {
            for entry in jobs.entries.values() {
                if !entry.status.state.is_finished() {
                    entry.cancel.cancel();
                }
            }
        });
    }

    #[must_use]
    pub fn retained(&self) -> usize {
        self.with_jobs(|jobs| jobs.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn tenant(s: &str) -> TenantId {
        TenantId::new(s).unwrap()
    }

    async fn wait_finished(tracker: &JobTracker, tenant: &TenantId, id: Uuid) -> JobStatus {
        for _ in 0..500 {
            let status = tracker.get_status(tenant, id).unwrap();
            if status.state.is_finished() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} did not finish");
    }

    #[tokio::test]
    async fn completed_job_reports_count() {
        let tracker = JobTracker::new(8);
        let t = tenant("a");
        let id = tracker.submit(t.clone(), "doc", async { Ok(7) });
        let status = wait_finished(&tracker, &t, id).await;
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.chunks_stored, 7);
        assert!(status.finished_at.is_some());
    }

    #[tokio::test]
    async fn failed_job_keeps_tenant_safe_message() {
        let tracker = JobTracker::new(8);
        let t = tenant("a");
        let id = tracker.submit(t.clone(), "doc", async {
            Err(RagError::Validation("chunk_size must be positive".into()))
        });
        let status = wait_finished(&tracker, &t, id).await;
        assert_eq!(status.state, JobState::Failed);
        assert!(status.error.unwrap().contains("chunk_size"));
    }

    #[tokio::test]
    async fn jobs_are_tenant_scoped() {
        let tracker = JobTracker::new(8);
        let id = tracker.submit(tenant("a"), "doc", async { Ok(1) });
        assert!(matches!(
            tracker.get_status(&tenant("b"), id),
            Err(RagError::NotFound(_))
        ));
        assert!(tracker.cancel(&tenant("b"), id).is_err());
    }

    #[tokio::test]
    async fn cancel_stops_running_job() {
        let tracker = JobTracker::new(8);
        let t = tenant("a");
        let id = tracker.submit(t.clone(), "crawl", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(1)
        });
        assert!(tracker.cancel(&t, id).unwrap());
        let status = wait_finished(&tracker, &t, id).await;
        assert_eq!(status.state, JobState::Cancelled);
        assert!(!tracker.cancel(&t, id).unwrap());
    }

    #[tokio::test]
    async fn oldest_finished_jobs_are_evicted() {
        let tracker = JobTracker::new(2);
        let t = tenant("a");
        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = tracker.submit(t.clone(), "doc", async { Ok(1) });
            wait_finished(&tracker, &t, id).await;
            ids.push(id);
        }
        assert_eq!(tracker.retained(), 2);
        assert!(tracker.get_status(&t, ids[0]).is_err());
        assert!(tracker.get_status(&t, ids[2]).is_ok());
    }
}
