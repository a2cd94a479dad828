use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use dashmap::DashMap;
use tokio::task::AbortHandle;

/// A monotonically increasing per-connection identifier. Used as the
/// session registry's key instead of a reference-counted, nullable-slot
/// linked list, so the reaper never has to mutate the collection it is
/// currently iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

#[derive(Default)]
struct SessionIdGen(AtomicU64);

impl SessionIdGen {
    fn next(&self) -> SessionId {
        SessionId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// What the registry keeps about a live session: enough to cancel it and
/// to run the idle-eviction sweep without reaching into the session task
/// itself.
pub struct SessionHandle {
    idle: AtomicBool,
    abort: OnceLock<AbortHandle>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self {
            idle: AtomicBool::new(false),
            abort: OnceLock::new(),
        }
    }

    /// Published once, right after the session task is spawned. Every
    /// handle reachable through the registry has this set — the server
    /// inserts into the registry only after calling this.
    pub fn set_abort(&self, abort: AbortHandle) {
        let _ = self.abort.set(abort);
    }

    /// Called by the session on every completed read or write. Clears the
    /// idle flag the reaper sets.
    pub fn mark_active(&self) {
        self.idle.store(false, Ordering::Relaxed);
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// The live session table, keyed by id. Closing a session removes its
/// entry by key; the reaper's sweep removes entries in place via
/// `DashMap::retain` rather than nulling out slots in a list and
/// compacting it afterward.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    ids: SessionIdGen,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> SessionId {
        self.ids.next()
    }

    pub fn insert(&self, id: SessionId, handle: Arc<SessionHandle>) {
        self.sessions.insert(id, handle);
    }

    pub fn remove(&self, id: SessionId) {
        self.sessions.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// One reaper tick. A session already marked idle from the previous
    /// tick is aborted and dropped; everything else is marked idle for the
    /// next tick. A session is only evicted once it has gone two whole
    /// ticks with no activity — the same double-tick window the original
    /// timeout source sweep used.
    pub fn reap_tick(&self) {
        let mut evicted = 0usize;
        self.sessions.retain(|_, handle| {
            if handle.idle.swap(true, Ordering::Relaxed) {
                if let Some(abort) = handle.abort.get() {
                    abort.abort();
                }
                evicted += 1;
                false
            } else {
                true
            }
        });
        if evicted > 0 {
            tracing::debug!(evicted, "reaper evicted idle sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_survives_one_idle_tick_then_is_evicted() {
        let registry = SessionRegistry::new();
        let id = registry.next_id();
        let handle = Arc::new(SessionHandle::new());
        registry.insert(id, handle.clone());

        registry.reap_tick();
        assert_eq!(registry.len(), 1, "first tick only marks idle");

        registry.reap_tick();
        assert_eq!(registry.len(), 0, "second idle tick evicts");
    }

    #[test]
    fn activity_between_ticks_resets_the_window() {
        let registry = SessionRegistry::new();
        let id = registry.next_id();
        let handle = Arc::new(SessionHandle::new());
        registry.insert(id, handle.clone());

        registry.reap_tick();
        handle.mark_active();
        registry.reap_tick();
        assert_eq!(registry.len(), 1, "activity should have reset the idle flag");
    }
}
