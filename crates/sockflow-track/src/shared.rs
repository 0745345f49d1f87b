//! Mutex-guarded tracking cache for concurrent collectors.
//!
//! `observe` is a read-modify-write on `occurrence_count` and `last_seen`,
//! so every mutation, including eviction, runs under one lock.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use sockflow_common::error::{Result, SockflowError};

use crate::cache::{BatchSummary, EvictionReport, TrackingCache};
use crate::observation::{Observation, ObservationFilter, RawObservation};
use crate::record::ConnectionRecord;

/// Cloneable handle to a cache shared between threads.
#[derive(Debug, Clone, Default)]
pub struct SharedTrackingCache {
    inner: Arc<Mutex<TrackingCache>>,
}

impl SharedTrackingCache {
    /// Wraps a cache for shared use.
    #[must_use]
    pub fn new(cache: TrackingCache) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    /// Records one observation and returns a copy of the resulting record.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn observe_at(
        &self,
        observation: Observation,
        now: DateTime<Utc>,
    ) -> Result<(ConnectionRecord, bool)> {
        let mut cache = lock_cache(&self.inner)?;
        let (record, is_new) = cache.observe_at(observation, now);
        Ok((record.clone(), is_new))
    }

    /// Applies a whole batch atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn observe_batch(
        &self,
        observations: &[RawObservation],
        filter: &ObservationFilter,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary> {
        Ok(lock_cache(&self.inner)?.observe_batch(observations, filter, now))
    }

    /// Runs eviction and the retention sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn finish_batch(&self, now: DateTime<Utc>) -> Result<EvictionReport> {
        Ok(lock_cache(&self.inner)?.finish_batch(now))
    }

    /// Copies all records out, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn snapshot(&self) -> Result<Vec<ConnectionRecord>> {
        Ok(lock_cache(&self.inner)?.snapshot())
    }

    /// Runs `f` with exclusive access to the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn with<T>(&self, f: impl FnOnce(&mut TrackingCache) -> T) -> Result<T> {
        let mut cache = lock_cache(&self.inner)?;
        Ok(f(&mut cache))
    }
}

fn lock_cache(mutex: &Mutex<TrackingCache>) -> Result<MutexGuard<'_, TrackingCache>> {
    mutex.lock().map_err(|_| SockflowError::Config {
        message: "tracking cache lock poisoned".into(),
    })
}
