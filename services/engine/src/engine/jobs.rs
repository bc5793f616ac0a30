//! Registry of in-flight jobs.

use std::collections::HashMap;

use tierload_key::Fingerprint;

use super::job::{EngineJob, JobId};

/// In-flight jobs, one per fingerprint, kept apart for cache-only loads.
#[derive(Default)]
pub(crate) struct Jobs {
    jobs: HashMap<Fingerprint, EngineJob>,
    only_cache_jobs: HashMap<Fingerprint, EngineJob>,
}

impl Jobs {
    fn map_mut(&mut self, only_cache: bool) -> &mut HashMap<Fingerprint, EngineJob> {
        if only_cache {
            &mut self.only_cache_jobs
        } else {
            &mut self.jobs
        }
    }

    pub(crate) fn get_mut(&mut self, key: &Fingerprint, only_cache: bool) -> Option<&mut EngineJob> {
        self.map_mut(only_cache).get_mut(key)
    }

    pub(crate) fn put(&mut self, key: Fingerprint, job: EngineJob) {
        let only_cache = job.flags().only_retrieve_from_cache;
        self.map_mut(only_cache).insert(key, job);
    }

    /// Removes the job only if the one registered under `key` is `job_id`.
    pub(crate) fn remove_if_current(
        &mut self,
        key: &Fingerprint,
        only_cache: bool,
        job_id: JobId,
    ) -> Option<EngineJob> {
        let map = self.map_mut(only_cache);
        if map.get(key)?.id() != job_id {
            return None;
        }
        map.remove(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len() + self.only_cache_jobs.len()
    }

    pub(crate) fn drain(&mut self) -> Vec<EngineJob> {
        self.jobs
            .drain()
            .chain(self.only_cache_jobs.drain())
            .map(|(_, job)| job)
            .collect()
    }
}
