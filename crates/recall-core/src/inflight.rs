//! Per-user in-flight set
//!
//! At most one analysis runs per user. Acquisition is an atomic
//! insert-if-absent; the returned guard releases the entry on drop, on every
//! exit path including panics inside the analysis task.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use recall_state::UserId;

#[derive(Debug, Default)]
pub struct InFlightSet {
    users: Mutex<HashSet<UserId>>,
}

impl InFlightSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark `user` in flight. Returns `None` if it already is.
    pub fn try_acquire(self: &Arc<Self>, user: UserId) -> Option<InFlightGuard> {
        if self.lock().insert(user) {
            Some(InFlightGuard {
                set: Arc::clone(self),
                user,
            })
        } else {
            None
        }
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.lock().contains(&user)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Never held across an await.
    fn lock(&self) -> MutexGuard<'_, HashSet<UserId>> {
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Releases its user from the set when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    set: Arc<InFlightSet>,
    user: UserId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let set = InFlightSet::new();
        let guard = set.try_acquire(UserId(1)).expect("first acquire");
        assert!(set.try_acquire(UserId(1)).is_none());
        assert!(set.try_acquire(UserId(2)).is_some());
        assert!(set.contains(UserId(1)));

        drop(guard);
        assert!(!set.contains(UserId(1)));
        assert!(set.try_acquire(UserId(1)).is_some());
    }

    #[test]
    fn guard_released_on_panic() {
        let set = InFlightSet::new();
        let cloned = Arc::clone(&set);
        let result = std::thread::spawn(move || {
            let _guard = cloned.try_acquire(UserId(5)).unwrap();
            panic!("analysis blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(set.is_empty());
    }
}
