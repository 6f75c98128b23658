//! Shared limiter settings that can change while checks are in flight.
//!
//! Snapshots are `Arc`s, so a check keeps one consistent view for its whole run even if an
//! update lands halfway through. The default backend is `ArcSwap`; the `dynamic-rwlock`
//! feature trades it for a `RwLock` and clones on read.

use std::sync::Arc;

#[cfg(feature = "dynamic-rwlock")]
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(not(feature = "dynamic-rwlock"))]
use arc_swap::{ArcSwap, Guard};

#[cfg(not(feature = "dynamic-rwlock"))]
type Slot<T> = ArcSwap<T>;

#[cfg(feature = "dynamic-rwlock")]
type Slot<T> = RwLock<T>;

/// Settings cell shared between the limiter and whoever reconfigures it.
///
/// Clones point at the same slot.
#[derive(Debug)]
pub struct DynamicConfig<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for DynamicConfig<T> {
    fn clone(&self) -> Self {
        Self { slot: Arc::clone(&self.slot) }
    }
}

#[cfg(not(feature = "dynamic-rwlock"))]
impl<T: Clone> DynamicConfig<T> {
    pub fn new(value: T) -> Self {
        Self { slot: Arc::new(ArcSwap::from_pointee(value)) }
    }

    pub fn get(&self) -> Arc<T> {
        self.slot.load_full()
    }

    /// Overwrite the held value, discarding whatever was there.
    pub fn set(&self, value: T) {
        self.slot.store(Arc::new(value));
    }

    /// Replace the held value with `derive(current)`, or keep it when `derive` fails.
    ///
    /// If another writer swaps the value between the read and the swap, `derive` runs again
    /// against the newer value, so no concurrent update is lost. `derive` may therefore be
    /// called more than once.
    pub fn try_update<F, E>(&self, mut derive: F) -> Result<Arc<T>, E>
    where
        F: FnMut(&T) -> Result<T, E>,
    {
        let mut seen = self.slot.load_full();
        loop {
            let next = Arc::new(derive(&*seen)?);
            let previous = self.slot.compare_and_swap(&seen, Arc::clone(&next));
            if Arc::ptr_eq(&*previous, &seen) {
                return Ok(next);
            }
            seen = Guard::into_inner(previous);
        }
    }
}

#[cfg(feature = "dynamic-rwlock")]
impl<T: Clone> DynamicConfig<T> {
    pub fn new(value: T) -> Self {
        Self { slot: Arc::new(RwLock::new(value)) }
    }

    // A panicking writer never leaves a partial value behind, so poison is ignored.
    fn read(&self) -> RwLockReadGuard<'_, T> {
        self.slot.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> Arc<T> {
        Arc::new(self.read().clone())
    }

    /// Overwrite the held value, discarding whatever was there.
    pub fn set(&self, value: T) {
        *self.write() = value;
    }

    /// Replace the held value with `derive(current)`, or keep it when `derive` fails.
    ///
    /// The write lock is held from the read to the store, so updates serialize.
    pub fn try_update<F, E>(&self, mut derive: F) -> Result<Arc<T>, E>
    where
        F: FnMut(&T) -> Result<T, E>,
    {
        let mut held = self.write();
        let next = derive(&*held)?;
        *held = next.clone();
        Ok(Arc::new(next))
    }
}
