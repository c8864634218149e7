//! Shared handle to module-owned chart state.

use parking_lot::RwLock;
use std::sync::Arc;

/// A handle to data shared between a module and the job running it.
///
/// The module keeps one clone to add or retire charts while collecting,
/// the job keeps another to synchronize them with the receiver.
/// Guards must not be held across an `.await`.
#[derive(Default)]
pub struct ChartHandle<T> {
    data: Arc<RwLock<T>>,
}

impl<T> Clone for ChartHandle<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T> ChartHandle<T> {
    /// Create a new handle with the given initial value
    pub fn new(initial: T) -> Self {
        Self {
            data: Arc::new(RwLock::new(initial)),
        }
    }

    /// Update the data using a closure
    ///
    /// # Example
    ///
    /// ```ignore
    /// handle.update(|charts| {
    ///     charts.get_mut("cpu").map(|c| c.mark_remove());
    /// });
    /// ```
    pub fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut guard = self.data.write();
        f(&mut *guard)
    }

    /// Get a write lock to the data
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, T> {
        self.data.write()
    }

    /// Get a read lock to the data
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, T> {
        self.data.read()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ChartHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartHandle")
            .field("data", &*self.data.read())
            .finish()
    }
}
