//! A statically-typed attribute store for sessions.
//!
//! The raw spec models attributes as `string -> opaque value`. Rather
//! than exposing `Any` at every call site, callers mint an
//! [`AttributeKey<T>`] once (typically a `static` or a field on their
//! handler) and use it for both `set` and `get`; the `PhantomData<T>`
//! gives the compiler the downcast target so lookups are statically
//! typed despite the erased storage underneath.
//!
//! The map itself is a [`dashmap::DashMap`], matching the concurrent-map
//! discipline the spec requires explicitly (§5, §9): attributes are read
//! and written from any thread holding the session, not just the
//! processor's worker.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;

/// A typed handle for one attribute slot. Two keys with the same name
/// but different `T` are distinct slots are not interchangeable — the
/// name is just the storage key, `T` is enforced at the API boundary.
pub struct AttributeKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    pub const fn new(name: &'static str) -> Self {
        AttributeKey {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

// Manual impls: `T` need not be `Clone`/`Copy` for the key itself to be.
impl<T> Clone for AttributeKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for AttributeKey<T> {}

impl<T> fmt::Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttributeKey").field(&self.name).finish()
    }
}

/// The concurrent attribute map owned by a [`crate::session::Session`].
#[derive(Default)]
pub struct AttributeMap {
    values: DashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl AttributeMap {
    pub fn new() -> Self {
        AttributeMap {
            values: DashMap::new(),
        }
    }

    pub fn set<T: Send + Sync + 'static>(&self, key: AttributeKey<T>, value: T) {
        self.values.insert(key.name(), Arc::new(value));
    }

    pub fn get<T: Send + Sync + Clone + 'static>(&self, key: AttributeKey<T>) -> Option<T> {
        self.values
            .get(key.name())
            .and_then(|v| v.downcast_ref::<T>().cloned())
    }

    pub fn contains<T>(&self, key: AttributeKey<T>) -> bool {
        self.values.contains_key(key.name())
    }

    pub fn remove<T>(&self, key: AttributeKey<T>) -> bool {
        self.values.remove(key.name()).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_roundtrip() {
        const COUNT: AttributeKey<u32> = AttributeKey::new("count");
        let map = AttributeMap::new();
        assert!(!map.contains(COUNT));
        map.set(COUNT, 42);
        assert_eq!(map.get(COUNT), Some(42));
        assert!(map.contains(COUNT));
        assert!(map.remove(COUNT));
        assert_eq!(map.get(COUNT), None);
    }

    #[test]
    fn distinct_keys_are_independent() {
        const A: AttributeKey<&'static str> = AttributeKey::new("a");
        const B: AttributeKey<i32> = AttributeKey::new("b");
        let map = AttributeMap::new();
        map.set(A, "hello");
        map.set(B, 7);
        assert_eq!(map.get(A), Some("hello"));
        assert_eq!(map.get(B), Some(7));
    }
}
