//! Deduplicating connection tracking cache.
//!
//! Repeated observations of the same relationship fold into one
//! [`ConnectionRecord`]. The cache is bounded two ways:
//!
//! - **Capacity**: when it holds more than `capacity` records, the least
//!   recently seen ones are dropped until it is back to
//!   `capacity * (100 - eviction_percent) / 100`.
//! - **Retention**: records first seen longer ago than the retention
//!   window are swept.
//!
//! Records observed in the batch that is currently open are evicted only
//! when nothing older is left, and are never swept.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{DateTime, TimeDelta, Utc};
use sockflow_common::config::TrackerConfig;
use sockflow_common::constants;
use sockflow_common::types::{Direction, Protocol};

use crate::endpoint::Endpoint;
use crate::observation::{Observation, ObservationFilter, RawObservation};
use crate::record::{ConnectionRecord, relationship_key};

/// Lifetime counters of a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Records created.
    pub inserts: u64,
    /// Observations folded into an existing record.
    pub hits: u64,
    /// Records dropped by capacity eviction.
    pub evictions: u64,
    /// Records dropped by the retention sweep.
    pub expirations: u64,
}

/// Records removed when a batch is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Dropped by capacity eviction.
    pub evicted: usize,
    /// Dropped by the retention sweep.
    pub expired: usize,
}

/// Outcome of [`TrackingCache::observe_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Observations offered to the cache.
    pub observed: usize,
    /// Observations that created a record.
    pub new: usize,
    /// Observations folded into an existing record.
    pub updated: usize,
    /// Observations rejected by the filter.
    pub filtered: usize,
    /// Records dropped by capacity eviction.
    pub evicted: usize,
    /// Records dropped by the retention sweep.
    pub expired: usize,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    record: ConnectionRecord,
    /// Batch generation that last touched the record (0 = outside a batch).
    batch: u64,
    /// Global touch order, breaks `last_seen` ties.
    touch: u64,
}

/// Keyed store of canonical connection records.
#[derive(Debug, Clone)]
pub struct TrackingCache {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
    retention: TimeDelta,
    eviction_percent: u8,
    generation: u64,
    open_batch: Option<u64>,
    touches: u64,
    stats: CacheStats,
}

impl TrackingCache {
    /// Creates an empty cache with the default eviction share.
    #[must_use]
    pub fn new(capacity: usize, retention_secs: u64) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            retention: i64::try_from(retention_secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .unwrap_or(TimeDelta::MAX),
            eviction_percent: constants::DEFAULT_EVICTION_PERCENT,
            generation: 0,
            open_batch: None,
            touches: 0,
            stats: CacheStats::default(),
        }
    }

    /// Creates an empty cache from tracker configuration.
    #[must_use]
    pub fn from_config(config: &TrackerConfig) -> Self {
        let mut cache = Self::new(config.capacity, config.retention_secs);
        cache.eviction_percent = config.eviction_percent.clamp(1, 100);
        cache
    }

    /// Rebuilds a cache from previously persisted records.
    ///
    /// Records are repaired, and later duplicates of a key are merged
    /// into the first one.
    #[must_use]
    pub fn from_records(config: &TrackerConfig, mut records: Vec<ConnectionRecord>) -> Self {
        let mut cache = Self::from_config(config);
        records.iter_mut().for_each(ConnectionRecord::repair);
        records.sort_by_key(|r| r.last_seen);
        for record in records {
            cache.touches += 1;
            let touch = cache.touches;
            match cache.entries.entry(record.key.clone()) {
                Entry::Occupied(mut occupied) => {
                    let existing = &mut occupied.get_mut().record;
                    existing.first_seen = existing.first_seen.min(record.first_seen);
                    existing.last_seen = existing.last_seen.max(record.last_seen);
                    existing.occurrence_count = existing
                        .occurrence_count
                        .saturating_add(record.occurrence_count);
                    occupied.get_mut().touch = touch;
                }
                Entry::Vacant(vacant) => {
                    let _ = vacant.insert(CacheEntry {
                        record,
                        batch: 0,
                        touch,
                    });
                }
            }
        }
        tracing::debug!(records = cache.entries.len(), "tracking cache restored");
        cache
    }

    /// Records one observation at the current time.
    ///
    /// Returns the record and whether it was newly created.
    pub fn observe(
        &mut self,
        local: Endpoint,
        remote: Endpoint,
        protocol: Protocol,
        direction: Direction,
        process: &str,
    ) -> (&ConnectionRecord, bool) {
        let observation = Observation {
            local,
            remote,
            protocol,
            direction,
            process: process.to_owned(),
        };
        self.observe_at(observation, Utc::now())
    }

    /// Records one observation at an explicit time.
    ///
    /// A miss creates a record with `first_seen = last_seen = now` and a
    /// count of one. A hit moves `last_seen`, bumps the count, and fills
    /// in the process if it was unknown.
    pub fn observe_at(
        &mut self,
        observation: Observation,
        now: DateTime<Utc>,
    ) -> (&ConnectionRecord, bool) {
        let key = relationship_key(
            &observation.local,
            &observation.remote,
            observation.protocol,
            observation.direction,
        );
        self.touches += 1;
        let touch = self.touches;
        let batch = self.open_batch.unwrap_or(0);

        match self.entries.entry(key) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                entry.record.touch(&observation.process, now);
                entry.batch = batch;
                entry.touch = touch;
                self.stats.hits += 1;
                tracing::trace!(
                    key = %entry.record.key,
                    count = entry.record.occurrence_count,
                    "relationship seen again"
                );
                (&entry.record, false)
            }
            Entry::Vacant(vacant) => {
                let record = ConnectionRecord::first_observation(
                    observation.local,
                    observation.remote,
                    observation.protocol,
                    observation.direction,
                    observation.process,
                    now,
                );
                tracing::debug!(key = %record.key, process = %record.process, "new relationship");
                self.stats.inserts += 1;
                let entry = vacant.insert(CacheEntry {
                    record,
                    batch,
                    touch,
                });
                (&entry.record, true)
            }
        }
    }

    /// Opens a new observation batch.
    ///
    /// Records touched until [`TrackingCache::finish_batch`] are protected
    /// from eviction and expiry.
    pub fn begin_batch(&mut self) {
        self.generation += 1;
        self.open_batch = Some(self.generation);
    }

    /// Applies capacity eviction and the retention sweep, then closes the
    /// open batch.
    pub fn finish_batch(&mut self, now: DateTime<Utc>) -> EvictionReport {
        let report = EvictionReport {
            evicted: self.evict_excess(),
            expired: self.sweep_expired(now),
        };
        self.open_batch = None;
        report
    }

    /// Normalizes, filters, and records a whole collection cycle.
    pub fn observe_batch(
        &mut self,
        observations: &[RawObservation],
        filter: &ObservationFilter,
        now: DateTime<Utc>,
    ) -> BatchSummary {
        let mut summary = BatchSummary {
            observed: observations.len(),
            ..BatchSummary::default()
        };

        self.begin_batch();
        for raw in observations {
            let observation = raw.normalize();
            if !filter.allows(&observation) {
                summary.filtered += 1;
                continue;
            }
            let (_, is_new) = self.observe_at(observation, now);
            if is_new {
                summary.new += 1;
            } else {
                summary.updated += 1;
            }
        }
        let report = self.finish_batch(now);
        summary.evicted = report.evicted;
        summary.expired = report.expired;

        tracing::info!(
            observed = summary.observed,
            new = summary.new,
            updated = summary.updated,
            filtered = summary.filtered,
            evicted = summary.evicted,
            expired = summary.expired,
            tracked = self.entries.len(),
            "observation batch applied"
        );
        summary
    }

    /// Drops the least recently seen records once the cache is over
    /// capacity. Returns the number of records removed.
    ///
    /// Records outside the open batch go first. When those are not enough,
    /// records of the open batch follow in the same order, so the bound
    /// always holds. Calling it again without new inserts removes nothing.
    pub fn evict_excess(&mut self) -> usize {
        if self.entries.len() <= self.capacity {
            return 0;
        }
        let keep = retained_share(self.capacity, self.eviction_percent);
        let excess = self.entries.len().saturating_sub(keep);

        let mut candidates: Vec<(bool, DateTime<Utc>, u64, String)> = self
            .entries
            .iter()
            .map(|(key, entry)| {
                (
                    self.is_protected(entry),
                    entry.record.last_seen,
                    entry.touch,
                    key.clone(),
                )
            })
            .collect();
        candidates.sort_unstable();

        let mut removed = 0;
        let mut removed_protected = 0;
        for (protected, _, _, key) in candidates.into_iter().take(excess) {
            if self.entries.remove(&key).is_some() {
                removed += 1;
                if protected {
                    removed_protected += 1;
                }
            }
        }
        self.stats.evictions += removed as u64;

        if removed_protected > 0 {
            tracing::warn!(
                removed_protected,
                capacity = self.capacity,
                "open batch exceeded capacity, evicted some of its records"
            );
        }
        tracing::debug!(removed, tracked = self.entries.len(), "capacity eviction");
        removed
    }

    /// Drops records first seen longer ago than the retention window.
    /// Returns the number of records removed.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.retention) else {
            return 0;
        };
        let open_batch = self.open_batch;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| Some(entry.batch) == open_batch || entry.record.first_seen >= cutoff);
        let removed = before - self.entries.len();
        self.stats.expirations += removed as u64;
        if removed > 0 {
            tracing::debug!(removed, "retention sweep");
        }
        removed
    }

    fn is_protected(&self, entry: &CacheEntry) -> bool {
        self.open_batch == Some(entry.batch)
    }

    /// Looks up a record by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConnectionRecord> {
        self.entries.get(key).map(|e| &e.record)
    }

    /// All records, ordered by key.
    #[must_use]
    pub fn records(&self) -> Vec<&ConnectionRecord> {
        let mut records: Vec<&ConnectionRecord> =
            self.entries.values().map(|e| &e.record).collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    /// Owned copies of all records, ordered by key.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ConnectionRecord> {
        self.records().into_iter().cloned().collect()
    }

    /// The most recently seen records of one direction, newest first.
    #[must_use]
    pub fn recent(&self, direction: Direction, limit: usize) -> Vec<&ConnectionRecord> {
        let mut entries: Vec<&CacheEntry> = self
            .entries
            .values()
            .filter(|e| e.record.direction == direction)
            .collect();
        entries.sort_by(|a, b| {
            b.record
                .last_seen
                .cmp(&a.record.last_seen)
                .then(b.touch.cmp(&a.touch))
        });
        entries.into_iter().take(limit).map(|e| &e.record).collect()
    }

    /// Number of tracked records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the cache holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Soft record limit.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lifetime counters.
    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }
}

/// `capacity * (100 - eviction_percent) / 100`, rounded down without
/// intermediate overflow.
fn retained_share(capacity: usize, eviction_percent: u8) -> usize {
    let keep_percent = usize::from(100 - eviction_percent.min(100));
    capacity / 100 * keep_percent + capacity % 100 * keep_percent / 100
}

impl Default for TrackingCache {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}
