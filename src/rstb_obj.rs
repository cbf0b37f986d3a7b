use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// Shares harness objects (tests, results) between tasks. Futures handed to the
// executor must be Send, so this wraps Arc<Mutex> even though the simulation
// itself is single threaded.
pub struct RstbObjSafe<T>(Arc<Mutex<T>>);

impl<T> RstbObjSafe<T> {
    pub fn new(data: T) -> RstbObjSafe<T> {
        RstbObjSafe(Arc::new(Mutex::new(data)))
    }
    pub fn get(&self) -> MutexGuard<'_, T> {
        // a panicking test must not take the result table down with it
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.get())
    }
}

impl<T> Clone for RstbObjSafe<T> {
    fn clone(&self) -> Self {
        RstbObjSafe(self.0.clone())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for RstbObjSafe<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&*self.get(), f)
    }
}
