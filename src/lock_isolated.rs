use std::cell::RefCell;
use std::fmt::{Debug, Error as FmtError, Formatter};

use parking_lot::ReentrantMutex;

/// A thread-safe box around a value.
///
/// Reads return a snapshot and writes go through [`with_value()`](LockIsolated::with_value),
/// which works on a private copy and stores it back once the closure returns.
/// The lock is reentrant, so a closure may call back into the same container
/// (directly or through a callback) on the same thread without deadlocking.
/// In that case the outermost call's copy is the one stored last.
pub struct LockIsolated<T> {
    inner: ReentrantMutex<RefCell<T>>,
}

impl<T: Clone> LockIsolated<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(value)),
        }
    }

    /// Returns a consistent snapshot of the current value.
    pub fn value(&self) -> T {
        let guard = self.inner.lock();
        let value = guard.borrow().clone();
        value
    }

    /// Runs `body` against an exclusive copy of the value and stores the copy back.
    ///
    /// Whatever `body` returns is returned unchanged, so a `Result` body
    /// propagates its error to the caller. If `body` panics the stored value is
    /// left as it was.
    pub fn with_value<R>(&self, body: impl FnOnce(&mut T) -> R) -> R {
        let guard = self.inner.lock();
        let mut copy = guard.borrow().clone();
        let result = body(&mut copy);
        *guard.borrow_mut() = copy;
        result
    }
}

impl<T: Clone + Default> Default for LockIsolated<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + Debug> Debug for LockIsolated<T> {
    fn fmt(&self, f: &mut Formatter) -> Result<(), FmtError> {
        f.debug_tuple("LockIsolated").field(&self.value()).finish()
    }
}
