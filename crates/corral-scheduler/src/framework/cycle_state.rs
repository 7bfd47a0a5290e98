use super::snapshot::Snapshot;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-attempt scratch space shared by the plugins of one scheduling cycle.
///
/// PreFilter and PreScore plugins write computed data here under their own
/// key; Filter and Score plugins read it back. Concurrent readers and writers
/// are safe.
pub struct CycleState {
    snapshot: Arc<Snapshot>,
    storage: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl CycleState {
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        Self {
            snapshot,
            storage: RwLock::new(HashMap::new()),
        }
    }

    /// The snapshot this attempt was started with
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn write<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.storage.write().insert(key.into(), Arc::new(value));
    }

    /// Read a value; `None` if absent or stored with a different type
    pub fn read<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.storage.read().get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    pub fn delete(&self, key: &str) {
        self.storage.write().remove(key);
    }
}

impl std::fmt::Debug for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleState")
            .field("nodes", &self.snapshot.len())
            .field("keys", &self.storage.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_read_write() {
        let state = CycleState::new(Arc::new(Snapshot::empty()));
        state.write("counter", 42u64);

        assert_eq!(*state.read::<u64>("counter").unwrap(), 42);
        assert!(state.read::<String>("counter").is_none());
        assert!(state.read::<u64>("missing").is_none());

        state.delete("counter");
        assert!(state.read::<u64>("counter").is_none());
    }

    #[test]
    fn test_concurrent_writers() {
        let state = Arc::new(CycleState::new(Arc::new(Snapshot::empty())));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = state.clone();
                std::thread::spawn(move || state.write(format!("key{}", i), i))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for i in 0..8 {
            assert_eq!(*state.read::<i32>(&format!("key{}", i)).unwrap(), i);
        }
    }
}
