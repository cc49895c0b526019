/*!
Deduplication cache.

Suppresses repeat reports of the same (text, format) within a cooldown
window. Lookups share a read lock; insertions, sweeps and clears take the
write lock.
*/

use parking_lot::{Mutex, RwLock};
use shared::{CacheStats, DecodeResult, Symbology};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Entries live for this many cooldowns before a sweep drops them
const RETENTION_COOLDOWNS: u32 = 2;

/// One remembered sighting
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: DecodeResult,
    pub inserted_at: Instant,
}

/// Cooldown-based duplicate filter
#[derive(Debug)]
pub struct DedupCache {
    entries: RwLock<HashMap<(String, Symbology), CacheEntry>>,
    cooldown: Duration,
    last_sweep: Mutex<Option<Instant>>,
}

impl DedupCache {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            cooldown,
            last_sweep: Mutex::new(None),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Change the cooldown; existing entries are judged by the new value
    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }

    /// Whether `result` was added less than one cooldown ago
    pub fn is_duplicate(&self, result: &DecodeResult) -> bool {
        self.is_duplicate_at(result, Instant::now())
    }

    /// [`is_duplicate`](Self::is_duplicate) judged at `now`
    pub fn is_duplicate_at(&self, result: &DecodeResult, now: Instant) -> bool {
        let entries = self.entries.read();
        entries
            .get(&result.key())
            .map(|entry| now.saturating_duration_since(entry.inserted_at) < self.cooldown)
            .unwrap_or(false)
    }

    /// Insert or replace the entry for `result`
    pub fn add(&self, result: DecodeResult) {
        self.add_at(result, Instant::now());
    }

    /// [`add`](Self::add) stamped with `now`
    pub fn add_at(&self, result: DecodeResult, now: Instant) {
        let key = result.key();
        self.entries.write().insert(
            key,
            CacheEntry {
                result,
                inserted_at: now,
            },
        );
    }

    /// Gate `result` at `now` under one write lock.
    ///
    /// Returns true for a duplicate, which leaves the entry untouched;
    /// otherwise the result is recorded and false is returned.
    pub fn check_and_add_at(&self, result: &DecodeResult, now: Instant) -> bool {
        let mut entries = self.entries.write();
        let key = result.key();
        if let Some(entry) = entries.get(&key) {
            if now.saturating_duration_since(entry.inserted_at) < self.cooldown {
                return true;
            }
        }
        entries.insert(
            key,
            CacheEntry {
                result: result.clone(),
                inserted_at: now,
            },
        );
        false
    }

    /// Drop entries older than two cooldowns; returns how many went
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    /// [`cleanup`](Self::cleanup) judged at `now`
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let retention = self.cooldown * RETENTION_COOLDOWNS;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < retention);
        *self.last_sweep.lock() = Some(now);

        let removed = before - entries.len();
        if removed > 0 {
            debug!("🧹 Dedup sweep removed {} entries", removed);
        }
        removed
    }

    /// Sweep at most once per cooldown interval
    pub fn maybe_cleanup_at(&self, now: Instant) -> usize {
        let due = match *self.last_sweep.lock() {
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
            None => true,
        };
        if due {
            self.cleanup_at(now)
        } else {
            0
        }
    }

    /// Forget everything
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cache_size: self.len(),
            cooldown_ms: self.cooldown.as_millis() as u64,
        }
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(Duration::from_millis(shared::defaults::COOLDOWN_MS))
    }
}
