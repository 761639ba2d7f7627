use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::debug;

/// Whether a guard grants shared or exclusive access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    Reader,
    Writer,
}

struct Slot {
    lock: Arc<RwLock<()>>,
    /// Holders plus waiters.
    refs: usize,
}

type SlotTable = Arc<Mutex<HashMap<String, Slot>>>;

/// Process-wide table of named reader/writer locks.
///
/// Cloning is cheap and clones share the same table.
#[derive(Clone, Default)]
pub struct NamedLockManager {
    slots: SlotTable,
}

/// Keeps a slot alive; the last lease to drop evicts it.
struct Lease {
    slots: SlotTable,
    name: String,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().expect("lock poisoned");
        if let Some(slot) = slots.get_mut(&self.name) {
            slot.refs -= 1;
            if slot.refs == 0 {
                slots.remove(&self.name);
                debug!(name = %self.name, "lock evicted");
            }
        }
    }
}

enum Held {
    Read(OwnedRwLockReadGuard<()>),
    Write(OwnedRwLockWriteGuard<()>),
}

/// A held named lock. Dropping it releases the lock.
pub struct LockGuard {
    // Declared before `lease` so the rwlock is released before the slot
    // reference is dropped.
    held: Held,
    lease: Lease,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.lease.name
    }

    pub fn mode(&self) -> LockMode {
        match self.held {
            Held::Read(_) => LockMode::Reader,
            Held::Write(_) => LockMode::Writer,
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("name", &self.name())
            .field("mode", &self.mode())
            .finish()
    }
}

impl NamedLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lease(&self, name: String) -> (Lease, Arc<RwLock<()>>) {
        let mut slots = self.slots.lock().expect("lock poisoned");
        let slot = slots.entry(name.clone()).or_insert_with(|| Slot {
            lock: Arc::new(RwLock::new(())),
            refs: 0,
        });
        slot.refs += 1;
        let lock = Arc::clone(&slot.lock);
        drop(slots);
        (
            Lease {
                slots: Arc::clone(&self.slots),
                name,
            },
            lock,
        )
    }

    /// Acquire `name` for shared access, waiting while a writer holds it.
    pub async fn acquire_reader(&self, name: impl Into<String>) -> LockGuard {
        let (lease, lock) = self.lease(name.into());
        let guard = lock.read_owned().await;
        LockGuard {
            held: Held::Read(guard),
            lease,
        }
    }

    /// Acquire `name` for exclusive access, waiting for every other holder.
    pub async fn acquire_writer(&self, name: impl Into<String>) -> LockGuard {
        let (lease, lock) = self.lease(name.into());
        let guard = lock.write_owned().await;
        LockGuard {
            held: Held::Write(guard),
            lease,
        }
    }

    /// Blocking form of [`acquire_reader`](Self::acquire_reader).
    ///
    /// Parks the calling thread. Must not be called from inside an async
    /// task, where it would stall the executor.
    pub fn acquire_reader_blocking(&self, name: impl Into<String>) -> LockGuard {
        futures::executor::block_on(self.acquire_reader(name))
    }

    /// Blocking form of [`acquire_writer`](Self::acquire_writer).
    pub fn acquire_writer_blocking(&self, name: impl Into<String>) -> LockGuard {
        futures::executor::block_on(self.acquire_writer(name))
    }

    /// Take a reader guard only if no writer holds or is queued for `name`.
    pub fn try_acquire_reader(&self, name: impl Into<String>) -> Option<LockGuard> {
        let (lease, lock) = self.lease(name.into());
        let guard = lock.try_read_owned().ok()?;
        Some(LockGuard {
            held: Held::Read(guard),
            lease,
        })
    }

    /// Take a writer guard only if `name` is entirely free.
    pub fn try_acquire_writer(&self, name: impl Into<String>) -> Option<LockGuard> {
        let (lease, lock) = self.lease(name.into());
        let guard = lock.try_write_owned().ok()?;
        Some(LockGuard {
            held: Held::Write(guard),
            lease,
        })
    }

    /// Release a guard. Equivalent to dropping it.
    pub fn release(&self, guard: LockGuard) {
        debug!(name = %guard.name(), mode = ?guard.mode(), "lock released");
        drop(guard);
    }

    /// Number of names with at least one holder or waiter.
    pub fn live_locks(&self) -> usize {
        self.slots.lock().expect("lock poisoned").len()
    }
}

impl fmt::Debug for NamedLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedLockManager")
            .field("live_locks", &self.live_locks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // -----------------------------------------------------------------------
    // Sharing and exclusion
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn readers_share_a_name() {
        let locks = NamedLockManager::new();
        let a = locks.acquire_reader("x").await;
        let b = locks.acquire_reader("x").await;
        assert_eq!(a.mode(), LockMode::Reader);
        assert_eq!(b.name(), "x");
        assert!(locks.try_acquire_writer("x").is_none());
        assert_eq!(locks.live_locks(), 1);
    }

    #[tokio::test]
    async fn writer_excludes_readers_and_writers() {
        let locks = NamedLockManager::new();
        let w = locks.acquire_writer("x").await;
        assert!(locks.try_acquire_reader("x").is_none());
        assert!(locks.try_acquire_writer("x").is_none());
        locks.release(w);
        assert!(locks.try_acquire_reader("x").is_some());
    }

    #[tokio::test]
    async fn distinct_names_are_independent() {
        let locks = NamedLockManager::new();
        let _a = locks.acquire_writer("a").await;
        let b = locks.try_acquire_writer("b");
        assert!(b.is_some());
        assert_eq!(locks.live_locks(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writers_are_serialized() {
        let locks = NamedLockManager::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let locks = locks.clone();
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                tokio::spawn(async move {
                    let _g = locks.acquire_writer("shared").await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.live_locks(), 0);
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn entry_evicted_after_last_release() {
        let locks = NamedLockManager::new();
        let a = locks.acquire_reader("x").await;
        let b = locks.acquire_reader("x").await;
        drop(a);
        assert_eq!(locks.live_locks(), 1);
        drop(b);
        assert_eq!(locks.live_locks(), 0);
    }

    #[tokio::test]
    async fn failed_try_does_not_leak_entry() {
        let locks = NamedLockManager::new();
        let w = locks.acquire_writer("x").await;
        assert!(locks.try_acquire_writer("x").is_none());
        drop(w);
        assert_eq!(locks.live_locks(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_releases_its_reference() {
        let locks = NamedLockManager::new();
        let w = locks.acquire_writer("x").await;
        let waited =
            tokio::time::timeout(Duration::from_millis(20), locks.acquire_reader("x")).await;
        assert!(waited.is_err());
        assert_eq!(locks.live_locks(), 1);
        drop(w);
        assert_eq!(locks.live_locks(), 0);
    }

    // -----------------------------------------------------------------------
    // Blocking path
    // -----------------------------------------------------------------------

    #[test]
    fn blocking_path_shares_state_with_async_path() {
        let locks = NamedLockManager::new();
        let w = locks.acquire_writer_blocking("x");
        assert!(locks.try_acquire_reader("x").is_none());

        let waiter = {
            let locks = locks.clone();
            std::thread::spawn(move || {
                let g = locks.acquire_reader_blocking("x");
                g.mode()
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        locks.release(w);
        assert_eq!(waiter.join().unwrap(), LockMode::Reader);
        assert_eq!(locks.live_locks(), 0);
    }

    #[test]
    fn blocking_readers_share() {
        let locks = NamedLockManager::new();
        let a = locks.acquire_reader_blocking("x");
        let b = locks.acquire_reader_blocking("x");
        assert_eq!(a.mode(), b.mode());
        assert_eq!(locks.live_locks(), 1);
    }
}
