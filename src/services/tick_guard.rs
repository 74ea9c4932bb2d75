//! Reentrancy guard for tick loops.

use std::sync::atomic::{AtomicBool, Ordering};

/// Held for the duration of one tick. A second tick started while a guard
/// is alive fails to acquire and is skipped instead of overlapping.
#[derive(Debug)]
pub struct TickGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> TickGuard<'a> {
    /// Take the guard, or `None` if another tick holds it.
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_excludes_second_holder() {
        let flag = AtomicBool::new(false);
        let guard = TickGuard::try_acquire(&flag);
        assert!(guard.is_some());
        assert!(TickGuard::try_acquire(&flag).is_none());

        drop(guard);
        assert!(TickGuard::try_acquire(&flag).is_some());
    }
}
