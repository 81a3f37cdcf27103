//! Replay protection for one-time-use assertions.
//!
//! The replay store is the only mutable state shared between concurrent
//! pipeline runs. Its check and insert must be a single atomic step so two
//! requests cannot both accept the same assertion.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::SamlResult;

/// Store of assertion IDs that have already been accepted.
pub trait ReplayStore: Send + Sync {
    /// Records `id` as seen until `expires_at` unless it is already recorded
    /// and unexpired.
    ///
    /// Returns `true` if the ID was recorded, `false` if it is a replay.
    fn check_and_insert(
        &self,
        id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SamlResult<bool>;

    /// Returns `true` if `id` is recorded and unexpired.
    fn contains(&self, id: &str, now: DateTime<Utc>) -> SamlResult<bool>;

    /// Forgets `id`, undoing a [`check_and_insert`](Self::check_and_insert)
    /// whose batch was rejected afterwards.
    fn remove(&self, id: &str) -> SamlResult<()>;

    /// Removes expired entries and returns how many were removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> SamlResult<usize>;
}

/// In-process replay store.
#[derive(Debug, Default)]
pub struct InMemoryReplayStore {
    entries: DashMap<String, DateTime<Utc>>,
}

impl InMemoryReplayStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ReplayStore for InMemoryReplayStore {
    fn check_and_insert(
        &self,
        id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SamlResult<bool> {
        // The entry guard holds the shard lock for the whole check.
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    return Ok(false);
                }
                entry.insert(expires_at);
                Ok(true)
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                Ok(true)
            }
        }
    }

    fn contains(&self, id: &str, now: DateTime<Utc>) -> SamlResult<bool> {
        Ok(self
            .entries
            .get(id)
            .is_some_and(|expires_at| *expires_at > now))
    }

    fn remove(&self, id: &str) -> SamlResult<()> {
        self.entries.remove(id);
        Ok(())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> SamlResult<usize> {
        let mut removed = 0;
        self.entries.retain(|_, expires_at| {
            let keep = *expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            tracing::debug!(removed, "Purged expired replay entries");
        }
        Ok(removed)
    }
}
