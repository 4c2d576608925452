//! Controller registry shared between the control loop and requester
//! threads.
//!
//! Reads (lookups, snapshots for a cycle) are wait-free via an
//! [`arc_swap::ArcSwap`] of the entry list. Structural changes copy the list;
//! callers serialize them through the roll monitor, which is what makes
//! insert-if-absent race-free. Entries keep registration order so each cycle
//! visits logs deterministically, and nothing is removed in steady state.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::controller::RollController;
use crate::wal::WalHandle;

/// Identity of a registered log: the address of its shared handle allocation.
///
/// Two clones of one `Arc` map to the same key; distinct allocations are
/// distinct logs. The registry holds a strong reference to every registered
/// handle, so a key cannot be recycled while its log is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalKey(usize);

impl WalKey {
    pub fn of(wal: &Arc<dyn WalHandle>) -> Self {
        Self(Arc::as_ptr(wal) as *const () as usize)
    }
}

type Entries = Vec<(WalKey, Arc<RollController>)>;

pub struct RollerRegistry {
    entries: ArcSwap<Entries>,
}

impl RollerRegistry {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    pub fn contains(&self, key: WalKey) -> bool {
        self.entries.load().iter().any(|(k, _)| *k == key)
    }

    pub fn get(&self, key: WalKey) -> Option<Arc<RollController>> {
        self.entries
            .load()
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, controller)| controller.clone())
    }

    /// Registered controllers in registration order.
    pub fn controllers(&self) -> Vec<Arc<RollController>> {
        self.entries
            .load()
            .iter()
            .map(|(_, controller)| controller.clone())
            .collect()
    }

    /// Entry list for one loop cycle. Later inserts produce a new list; the
    /// snapshot stays consistent for the cycle that loaded it.
    pub(crate) fn snapshot(&self) -> Arc<Entries> {
        self.entries.load_full()
    }

    /// Insert a controller unless the key is present. Returns whether an
    /// insert happened. Callers must hold the roll monitor.
    pub(crate) fn insert_if_absent(&self, key: WalKey, controller: Arc<RollController>) -> bool {
        if self.contains(key) {
            return false;
        }
        let mut next = Entries::clone(&self.entries.load());
        next.push((key, controller));
        self.entries.store(Arc::new(next));
        true
    }

    /// Lookup with insert-if-missing, for the listener path where the handle
    /// may have been concurrently re-registered. Callers must hold the roll
    /// monitor.
    pub(crate) fn get_or_insert_with<F>(&self, key: WalKey, create: F) -> Arc<RollController>
    where
        F: FnOnce() -> Arc<RollController>,
    {
        if let Some(existing) = self.get(key) {
            return existing;
        }
        let controller = create();
        let mut next = Entries::clone(&self.entries.load());
        next.push((key, controller.clone()));
        self.entries.store(Arc::new(next));
        controller
    }
}

impl Default for RollerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionId;
    use crate::error::RollerResult;
    use crate::wal::RollListener;

    struct NamedWal(&'static str);

    impl WalHandle for NamedWal {
        fn name(&self) -> &str {
            self.0
        }

        fn rotate(&self, _force: bool) -> RollerResult<Vec<RegionId>> {
            Ok(Vec::new())
        }

        fn shutdown(&self) -> RollerResult<()> {
            Ok(())
        }

        fn register_roll_listener(&self, _listener: RollListener) {}
    }

    fn handle(name: &'static str) -> Arc<dyn WalHandle> {
        Arc::new(NamedWal(name))
    }

    #[test]
    fn insert_is_idempotent_per_key() {
        let registry = RollerRegistry::new();
        let wal = handle("wal-0");
        let key = WalKey::of(&wal);

        let controller = RollController::new(wal.clone(), 1_000, 0);
        assert!(registry.insert_if_absent(key, controller.clone()));
        assert!(!registry.insert_if_absent(key, RollController::new(wal.clone(), 1_000, 0)));

        assert_eq!(registry.len(), 1);
        let looked_up = registry.get(key).expect("controller registered");
        assert!(Arc::ptr_eq(&looked_up, &controller));
    }

    #[test]
    fn clones_of_one_handle_share_a_key() {
        let wal = handle("wal-0");
        let other = handle("wal-0");
        assert_eq!(WalKey::of(&wal), WalKey::of(&wal.clone()));
        assert_ne!(WalKey::of(&wal), WalKey::of(&other));
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let registry = RollerRegistry::new();
        let names = ["wal-a", "wal-b", "wal-c"];
        for name in names {
            let wal = handle(name);
            let key = WalKey::of(&wal);
            registry.insert_if_absent(key, RollController::new(wal, 1_000, 0));
        }

        let snapshot = registry.snapshot();
        let seen: Vec<&str> = snapshot
            .iter()
            .map(|(_, controller)| controller.wal().name())
            .collect();
        assert_eq!(seen, names);
    }

    #[test]
    fn get_or_insert_reuses_existing_controller() {
        let registry = RollerRegistry::new();
        let wal = handle("wal-0");
        let key = WalKey::of(&wal);

        let first = registry.get_or_insert_with(key, || RollController::new(wal.clone(), 1_000, 0));
        let second =
            registry.get_or_insert_with(key, || panic!("existing controller must be reused"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }
}
