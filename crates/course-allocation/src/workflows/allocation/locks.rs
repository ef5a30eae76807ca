use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

/// Guards every write to course rosters (`taught_by`), whichever service performs it.
pub(crate) type RosterLock = Arc<Mutex<()>>;

/// Lazily created mutex per key, used to serialize work on one term or one preference set.
pub(crate) struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    /// Returns the mutex for `key`. Callers hold its guard for the duration of the unit of work.
    pub(crate) fn slot(&self, key: &K) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
