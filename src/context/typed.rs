use std::any::{Any, type_name};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use super::key::Key;

type Slot = Box<dyn Any + Send + Sync>;

/// Heterogeneous map addressed by [`Key`]s.
///
/// Values are checked on read: a slot holding a different type than the key
/// announces reads as absent (and is logged), it never transmutes.
#[derive(Default)]
pub struct TypedContext {
    values: HashMap<&'static str, Slot>,
}

impl TypedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<V: 'static>(&self, key: &Key<V>) -> Option<&V> {
        let slot = self.values.get(key.name())?;
        let value = (**slot).downcast_ref::<V>();
        if value.is_none() {
            mismatch::<V>(key);
        }
        value
    }

    pub fn get_mut<V: 'static>(&mut self, key: &Key<V>) -> Option<&mut V> {
        let slot = self.values.get_mut(key.name())?;
        let value = (**slot).downcast_mut::<V>();
        if value.is_none() {
            mismatch::<V>(key);
        }
        value
    }

    /// Store a value, returning the previous one if it had the same type
    pub fn put<V: Send + Sync + 'static>(&mut self, key: &Key<V>, value: V) -> Option<V> {
        self.values
            .insert(key.name(), Box::new(value))
            .and_then(|old| old.downcast::<V>().ok())
            .map(|old| *old)
    }

    /// Mutable access to a slot, creating (or replacing a mistyped) value first
    pub fn get_or_insert_with<V, F>(&mut self, key: &Key<V>, init: F) -> &mut V
    where
        V: Send + Sync + 'static,
        F: FnOnce() -> V,
    {
        let slot = match self.values.entry(key.name()) {
            Entry::Occupied(entry) if (**entry.get()).is::<V>() => entry.into_mut(),
            Entry::Occupied(mut entry) => {
                mismatch::<V>(key);
                entry.insert(Box::new(init()));
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(Box::new(init())),
        };

        match (**slot).downcast_mut::<V>() {
            Some(value) => value,
            None => unreachable!("slot {} was just checked to hold {}", key.name(), type_name::<V>()),
        }
    }

    pub fn remove<V: 'static>(&mut self, key: &Key<V>) -> Option<V> {
        self.values
            .remove(key.name())
            .and_then(|old| old.downcast::<V>().ok())
            .map(|old| *old)
    }

    pub fn contains_key<V>(&self, key: &Key<V>) -> bool {
        self.values.contains_key(key.name())
    }

    /// Read a copy of the value, or the type's zero value when absent
    pub fn value<V: Clone + Default + 'static>(&self, key: &Key<V>) -> V {
        self.get(key).cloned().unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn mismatch<V>(key: &Key<V>) {
    tracing::warn!(
        key = key.name(),
        expected = type_name::<V>(),
        "context slot holds a value of another type"
    );
}

impl fmt::Debug for TypedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("TypedContext").field("keys", &keys).finish()
    }
}
