#![allow(unused_macros)]

/// Helper macro for locking items without panicking on poison
///
/// Paths that run inside an intercepted call use this variant and skip their work when the
/// lock is poisoned.
///
/// ```rust, ignore
///  let Some(mut sink) = try_lock!(self.sink) else {
///      return;
///  };
/// ```
macro_rules! try_lock {
    ($lock:expr) => {
        $lock.lock().ok()
    };
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  let mut hooks = write_lock!(self.hooks);
///  hooks.register(hook);
/// ```
macro_rules! write_lock {
    ($arc_rwlock:expr) => {
        $arc_rwlock.write().expect("Failed to acquire write lock")
    };
}
