//! The process-wide capture instance.
//!
//! The first intercepted call brings the capture manager up ([`get_or_init`]) and process exit
//! flushes it ([`finalize`]). Several entry points (e.g. each `CreateDevice`) may hold the
//! instance; [`create_instance`] and [`destroy_instance`] reference count those holders and
//! the last release finalizes.
//!
//! Everything else in the crate takes the manager as an explicit `Arc` and never reads this
//! slot.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::{capture::CaptureManager, Error, Result};

struct Slot {
    manager: Arc<CaptureManager>,
    holders: usize,
}

static INSTANCE: Mutex<Option<Slot>> = Mutex::new(None);

fn slot() -> Result<MutexGuard<'static, Option<Slot>>> {
    INSTANCE.lock().map_err(|_| Error::LockError)
}

/// Returns the instance, creating it with `init` if there is none.
///
/// Does not count as a holder.
///
/// # Errors
/// Returns the error of `init`, or [`Error::LockError`] if the slot is poisoned.
pub fn get_or_init(
    init: impl FnOnce() -> Result<Arc<CaptureManager>>,
) -> Result<Arc<CaptureManager>> {
    let mut slot = slot()?;
    if let Some(existing) = slot.as_ref() {
        return Ok(Arc::clone(&existing.manager));
    }

    let manager = init()?;
    log::debug!("capture instance initialized");
    *slot = Some(Slot {
        manager: Arc::clone(&manager),
        holders: 0,
    });
    Ok(manager)
}

/// Adds a holder, creating the instance with `init` if there is none.
///
/// # Errors
/// Returns the error of `init`, or [`Error::LockError`] if the slot is poisoned.
pub fn create_instance(
    init: impl FnOnce() -> Result<Arc<CaptureManager>>,
) -> Result<Arc<CaptureManager>> {
    let mut slot = slot()?;
    match slot.as_mut() {
        Some(existing) => {
            existing.holders += 1;
            Ok(Arc::clone(&existing.manager))
        }
        None => {
            let manager = init()?;
            *slot = Some(Slot {
                manager: Arc::clone(&manager),
                holders: 1,
            });
            Ok(manager)
        }
    }
}

/// Drops a holder. The last one finalizes and clears the instance.
///
/// # Errors
/// Returns [`Error::NotInitialized`] when there is no instance, or the error of
/// [`CaptureManager::finalize`].
pub fn destroy_instance() -> Result<()> {
    let manager = {
        let mut slot = slot()?;
        let existing = slot.as_mut().ok_or(Error::NotInitialized)?;
        existing.holders = existing.holders.saturating_sub(1);
        if existing.holders > 0 {
            return Ok(());
        }
        slot.take().map(|s| s.manager)
    };

    match manager {
        Some(manager) => manager.finalize(),
        None => Err(Error::NotInitialized),
    }
}

/// Finalizes and clears the instance regardless of holders. Meant for process exit.
///
/// # Errors
/// Returns [`Error::NotInitialized`] when there is no instance, or the error of
/// [`CaptureManager::finalize`].
pub fn finalize() -> Result<()> {
    let manager = slot()?.take().ok_or(Error::NotInitialized)?.manager;
    manager.finalize()
}

/// Returns the instance, if one exists.
#[must_use]
pub fn current() -> Option<Arc<CaptureManager>> {
    slot()
        .ok()
        .and_then(|slot| slot.as_ref().map(|s| Arc::clone(&s.manager)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::DispatchTable, format::NullSink, settings::CaptureSettings,
    };

    fn make() -> Result<Arc<CaptureManager>> {
        Ok(CaptureManager::new(
            CaptureSettings::default(),
            DispatchTable::builder().build(),
            Box::new(NullSink),
        ))
    }

    // The slot is process-wide, so the whole lifecycle lives in one test.
    #[test]
    fn test_instance_lifecycle() {
        assert!(current().is_none());
        assert!(matches!(destroy_instance(), Err(Error::NotInitialized)));

        let first = create_instance(make).unwrap();
        let second = create_instance(|| panic!("instance already exists")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        destroy_instance().unwrap();
        assert!(current().is_some());
        assert!(!first.is_finalized());

        destroy_instance().unwrap();
        assert!(current().is_none());
        assert!(first.is_finalized());

        let lazy = get_or_init(make).unwrap();
        let again = get_or_init(|| Err(Error::NotInitialized)).unwrap();
        assert!(Arc::ptr_eq(&lazy, &again));

        finalize().unwrap();
        assert!(lazy.is_finalized());
        assert!(matches!(finalize(), Err(Error::NotInitialized)));
    }
}
