//! Process-wide job lock registry.
//!
//! At most one caller may advance a given job at a time.  A second
//! `generate`/`resume` for a job that is already being advanced fails fast
//! with [`PipelineError::JobBusy`] instead of waiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::pipeline::error::PipelineError;

type Registry = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Exclusive right to advance one job.  Released on drop.
#[derive(Debug)]
pub struct JobLock {
    job_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl JobLock {
    /// Take the lock for `job_id`, or fail with `JobBusy` if it is held.
    pub fn try_acquire(job_id: &str) -> Result<Self, PipelineError> {
        let mutex = {
            let mut map = registry().lock().unwrap_or_else(|p| p.into_inner());
            map.entry(job_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = mutex
            .try_lock_owned()
            .map_err(|_| PipelineError::JobBusy(job_id.to_string()))?;
        log::debug!("pipeline: lock acquired for {job_id}");
        Ok(Self {
            job_id: job_id.to_string(),
            guard: Some(guard),
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = registry().lock().unwrap_or_else(|p| p.into_inner());
        // Only the registry itself still refers to an idle mutex.
        if map
            .get(&self.job_id)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            map.remove(&self.job_id);
        }
    }
}

/// Whether some caller currently holds the lock for `job_id`.
pub fn is_locked(job_id: &str) -> bool {
    let map = registry().lock().unwrap_or_else(|p| p.into_inner());
    map.get(job_id).is_some_and(|m| m.try_lock().is_err())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_busy() {
        let first = JobLock::try_acquire("job_lock_a").unwrap();
        let err = JobLock::try_acquire("job_lock_a").unwrap_err();
        assert!(matches!(err, PipelineError::JobBusy(id) if id == "job_lock_a"));
        assert!(is_locked("job_lock_a"));
        drop(first);
        assert!(!is_locked("job_lock_a"));
        assert!(JobLock::try_acquire("job_lock_a").is_ok());
    }

    #[test]
    fn different_jobs_do_not_contend() {
        let _a = JobLock::try_acquire("job_lock_b").unwrap();
        let b = JobLock::try_acquire("job_lock_c").unwrap();
        assert_eq!(b.job_id(), "job_lock_c");
    }

    #[test]
    fn registry_entry_removed_after_release() {
        let lock = JobLock::try_acquire("job_lock_d").unwrap();
        drop(lock);
        let map = registry().lock().unwrap();
        assert!(!map.contains_key("job_lock_d"));
    }
}
