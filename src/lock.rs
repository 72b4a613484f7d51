//! Process-local operation locks keyed by namespace name.
//!
//! At most one live lock exists per key. A lock older than the timeout is
//! expired: any later acquire or sweep may reclaim it. Locks are released by
//! dropping the [`LockGuard`], and a guard only removes its own entry, so a
//! holder whose lock was reclaimed never releases the new holder's lock.
//!
//! These locks give no exclusion across processes or instances.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Default lifetime of a lock before it may be reclaimed.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct LockInfo {
    pub operation: String,
    pub acquired_at: DateTime<Utc>,
    pub lock_id: Uuid,
}

#[derive(Debug)]
struct LockEntry {
    info: LockInfo,
    started: Instant,
}

#[derive(Debug)]
struct Inner {
    timeout: Duration,
    entries: Mutex<HashMap<String, LockEntry>>,
}

/// Registry of operation locks shared by every request in the process. Clones share state.
#[derive(Clone, Debug)]
pub struct OperationLocks {
    inner: Arc<Inner>,
}

impl Default for OperationLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl OperationLocks {
    pub fn new(timeout: Duration) -> Self {
        OperationLocks {
            inner: Arc::new(Inner {
                timeout,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, LockEntry>> {
        // Entries stay consistent even if a holder panicked mid-operation.
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the lock for `key`, or `None` while another unexpired holder has it.
    pub fn try_acquire(&self, key: &str, operation: &str) -> Option<LockGuard> {
        let mut entries = self.entries();
        self.sweep_locked(&mut entries);
        if entries.contains_key(key) {
            return None;
        }
        let info = LockInfo {
            operation: operation.to_string(),
            acquired_at: Utc::now(),
            lock_id: Uuid::new_v4(),
        };
        let lock_id = info.lock_id;
        entries.insert(
            key.to_string(),
            LockEntry {
                info,
                started: Instant::now(),
            },
        );
        tracing::debug!(key, operation, %lock_id, "operation lock acquired");
        Some(LockGuard {
            locks: self.clone(),
            key: key.to_string(),
            lock_id,
        })
    }

    /// Current holder of `key`, including holders that have already expired but not been swept.
    pub fn holder(&self, key: &str) -> Option<LockInfo> {
        self.entries().get(key).map(|e| e.info.clone())
    }

    pub fn is_locked(&self, key: &str) -> bool {
        let entries = self.entries();
        entries
            .get(key)
            .map(|e| e.started.elapsed() < self.inner.timeout)
            .unwrap_or(false)
    }

    /// Number of unexpired locks currently held.
    pub fn live_count(&self) -> usize {
        let timeout = self.inner.timeout;
        self.entries()
            .values()
            .filter(|e| e.started.elapsed() < timeout)
            .count()
    }

    /// Remove expired locks. Returns how many were reclaimed.
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.entries();
        self.sweep_locked(&mut entries)
    }

    fn sweep_locked(&self, entries: &mut HashMap<String, LockEntry>) -> usize {
        let timeout = self.inner.timeout;
        let before = entries.len();
        entries.retain(|key, entry| {
            let live = entry.started.elapsed() < timeout;
            if !live {
                tracing::warn!(
                    "reclaiming expired lock on {} (operation {}, acquired at {})",
                    key,
                    entry.info.operation,
                    entry.info.acquired_at
                );
            }
            live
        });
        before - entries.len()
    }

    fn release(&self, key: &str, lock_id: Uuid) {
        let mut entries = self.entries();
        if entries.get(key).map(|e| e.info.lock_id) == Some(lock_id) {
            entries.remove(key);
            tracing::debug!(key, %lock_id, "operation lock released");
        }
    }
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    locks: OperationLocks,
    key: String,
    lock_id: Uuid,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn lock_id(&self) -> Uuid {
        self.lock_id
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.locks.release(&self.key, self.lock_id);
    }
}

/// Periodically sweep expired locks until the runtime shuts down.
pub fn spawn_lock_sweeper(locks: OperationLocks, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reclaimed = locks.sweep_expired();
            if reclaimed > 0 {
                tracing::info!("lock sweep reclaimed {} expired lock(s)", reclaimed);
            }
        }
    })
}
