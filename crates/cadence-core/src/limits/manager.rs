//! Sliding-window frequency limiting
//!
//! Constraint definitions and occurrence history are cached in memory behind
//! one lock. Checks and increments only touch the cache; durable writes are
//! queued to the serial [`FrequencyWriter`].
//!
//! Loading uncached constraints and reconciling definitions are serialized
//! by a second, async lock, so a load never caches history that a concurrent
//! reconcile has invalidated.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use super::store::FrequencyStore;
use super::types::{FrequencyConstraint, LimitError, LimitResult, Occurrence};
use super::writer::FrequencyWriter;
use crate::clock::Clock;

struct CacheEntry {
    constraint: FrequencyConstraint,
    // ascending
    occurrences: Vec<DateTime<Utc>>,
}

impl CacheEntry {
    fn is_over_limit(&self, now: DateTime<Utc>) -> bool {
        let count = self.constraint.count as usize;
        if count == 0 {
            return true;
        }
        if self.occurrences.len() < count {
            return false;
        }
        let oldest_in_window = self.occurrences[self.occurrences.len() - count];
        self.is_within_range(oldest_in_window, now)
    }

    fn is_within_range(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let elapsed = now.signed_duration_since(timestamp).to_std().unwrap_or_default();
        elapsed <= self.constraint.range
    }

    fn record(&mut self, now: DateTime<Utc>) {
        self.occurrences.retain(|ts| {
            let elapsed = now.signed_duration_since(*ts).to_std().unwrap_or_default();
            elapsed <= self.constraint.range
        });
        let position = self.occurrences.partition_point(|ts| *ts <= now);
        self.occurrences.insert(position, now);
    }
}

struct Shared {
    clock: Arc<dyn Clock>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    writer: FrequencyWriter,
}

impl Shared {
    fn cache(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_over_limit(&self, ids: &[String]) -> bool {
        let cache = self.cache();
        let now = self.clock.now();
        over_limit(&cache, ids, now)
    }

    fn check_and_increment(&self, ids: &[String]) -> bool {
        let mut cache = self.cache();
        let now = self.clock.now();
        if over_limit(&cache, ids, now) {
            return false;
        }

        let mut occurrences = Vec::with_capacity(ids.len());
        for id in ids {
            // evicted ids are skipped
            if let Some(entry) = cache.get_mut(id) {
                entry.record(now);
                occurrences.push(Occurrence::new(id.clone(), now));
            }
        }
        self.writer.record(occurrences);
        true
    }
}

fn over_limit(cache: &HashMap<String, CacheEntry>, ids: &[String], now: DateTime<Utc>) -> bool {
    ids.iter()
        .filter_map(|id| cache.get(id))
        .any(|entry| entry.is_over_limit(now))
}

/// Frozen view over a set of constraint IDs
#[derive(Clone)]
pub struct FrequencyChecker {
    ids: Vec<String>,
    shared: Arc<Shared>,
}

impl FrequencyChecker {
    /// Constraint IDs this checker covers
    #[must_use]
    pub fn constraint_ids(&self) -> &[String] {
        &self.ids
    }

    /// Whether any constraint has reached its limit within its window
    #[must_use]
    pub fn is_over_limit(&self) -> bool {
        self.shared.is_over_limit(&self.ids)
    }

    /// Record an occurrence against every constraint unless one is over its
    /// limit. Returns whether the occurrence was recorded.
    pub fn check_and_increment(&self) -> bool {
        self.shared.check_and_increment(&self.ids)
    }
}

impl std::fmt::Debug for FrequencyChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyChecker").field("ids", &self.ids).finish()
    }
}

/// Sliding-window rate limiter with a write-behind cache
pub struct FrequencyLimitManager {
    store: Arc<dyn FrequencyStore>,
    shared: Arc<Shared>,
    // held across store reads in loads and for a whole reconcile
    sync: AsyncMutex<()>,
}

impl FrequencyLimitManager {
    /// Create a manager. Must be called within a tokio runtime, which hosts
    /// the durable writer task.
    pub fn new(store: Arc<dyn FrequencyStore>, clock: Arc<dyn Clock>) -> Self {
        let writer = FrequencyWriter::spawn(store.clone());
        Self {
            store,
            shared: Arc::new(Shared {
                clock,
                cache: Mutex::new(HashMap::new()),
                writer,
            }),
            sync: AsyncMutex::new(()),
        }
    }

    /// Build a checker for `ids`, loading uncached constraints and their
    /// history from storage.
    ///
    /// # Errors
    ///
    /// [`LimitError::ConstraintNotFound`] when an ID has no stored definition.
    pub async fn get_frequency_checker(&self, ids: &[String]) -> LimitResult<FrequencyChecker> {
        let _sync = self.sync.lock().await;
        let missing: Vec<&String> = {
            let cache = self.shared.cache();
            ids.iter().filter(|id| !cache.contains_key(*id)).collect()
        };

        let mut loaded = Vec::with_capacity(missing.len());
        for id in missing {
            let constraint = self
                .store
                .get_constraint(id)
                .await?
                .ok_or_else(|| LimitError::ConstraintNotFound(id.clone()))?;
            let occurrences = self
                .store
                .get_occurrences(id)
                .await?
                .into_iter()
                .map(|o| o.timestamp)
                .collect::<Vec<_>>();
            loaded.push(CacheEntry {
                constraint,
                occurrences,
            });
        }

        if !loaded.is_empty() {
            let mut cache = self.shared.cache();
            for mut entry in loaded {
                entry.occurrences.sort();
                debug!(
                    constraint_id = %entry.constraint.id,
                    occurrences = entry.occurrences.len(),
                    "Cached frequency constraint"
                );
                cache.entry(entry.constraint.id.clone()).or_insert(entry);
            }
        }

        Ok(FrequencyChecker {
            ids: ids.to_vec(),
            shared: self.shared.clone(),
        })
    }

    /// Shortcut for `get_frequency_checker(ids)?.is_over_limit()` over
    /// cached constraints
    #[must_use]
    pub fn is_over_limit(&self, ids: &[String]) -> bool {
        self.shared.is_over_limit(ids)
    }

    /// Shortcut for `get_frequency_checker(ids)?.check_and_increment()` over
    /// cached constraints
    pub fn check_and_increment(&self, ids: &[String]) -> bool {
        self.shared.check_and_increment(ids)
    }

    /// Reconcile stored constraints with an authoritative list.
    ///
    /// New or re-counted definitions are upserted. Removed definitions are
    /// deleted with their history and evicted from the cache. A definition
    /// whose range changed loses its history.
    pub async fn set_constraints(&self, constraints: Vec<FrequencyConstraint>) -> LimitResult<()> {
        let _sync = self.sync.lock().await;
        let existing: HashMap<String, FrequencyConstraint> = self
            .store
            .get_all_constraints()
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        let incoming: HashSet<&str> = constraints.iter().map(|c| c.id.as_str()).collect();

        let delete: Vec<String> = existing
            .keys()
            .filter(|id| !incoming.contains(id.as_str()))
            .cloned()
            .collect();
        let mut reset = Vec::new();
        let mut upsert = Vec::new();

        for constraint in constraints {
            match existing.get(&constraint.id) {
                Some(current) if current.range != constraint.range => {
                    reset.push(constraint.id.clone());
                    upsert.push(constraint);
                }
                Some(current) if current.count == constraint.count => {}
                _ => upsert.push(constraint),
            }
        }

        let (removed, cleared) = (delete.len(), reset.len());
        let pending = {
            let mut cache = self.shared.cache();
            for id in &delete {
                cache.remove(id);
            }
            for constraint in &upsert {
                if let Some(entry) = cache.get_mut(&constraint.id) {
                    entry.constraint = constraint.clone();
                }
            }
            for id in &reset {
                if let Some(entry) = cache.get_mut(id) {
                    entry.occurrences.clear();
                }
            }
            // queued under the lock so later increments are written after
            // the replacement
            self.shared
                .writer
                .replace_constraints(delete, reset, upsert)
        };

        info!(removed, reset = cleared, "Frequency constraints updated");
        pending.wait().await?;
        Ok(())
    }

    /// Wait for all queued durable writes
    pub async fn flush(&self) {
        self.shared.writer.flush().await;
    }
}
