//! Single-slot admission control
//!
//! At most one frame is processed per engine. A frame that arrives while
//! another is in flight is dropped, never queued: the camera will deliver a
//! fresher one shortly.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

/// Non-blocking, drop-on-busy gate around the state it protects.
///
/// The only way to reach the protected state is through a [`GatePass`], so
/// holding the pass is what makes unsynchronized scratch reuse sound.
#[derive(Debug)]
pub struct ConcurrencyGate<T> {
    slot: Mutex<T>,
    admitted: AtomicU64,
    dropped: AtomicU64,
}

impl<T> ConcurrencyGate<T> {
    pub fn new(state: T) -> Self {
        Self {
            slot: Mutex::new(state),
            admitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enter the slot if it is free. Never blocks.
    pub fn try_enter(&self) -> Option<GatePass<'_, T>> {
        match self.slot.try_lock() {
            Some(guard) => {
                self.admitted.fetch_add(1, Ordering::Relaxed);
                Some(GatePass { guard })
            }
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_locked()
    }

    /// Number of successful entries
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    /// Number of entries refused because the slot was busy
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Direct access when the gate itself is exclusively borrowed
    pub fn get_mut(&mut self) -> &mut T {
        self.slot.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.slot.into_inner()
    }
}

/// Proof of admission. The slot is released when the pass is dropped,
/// including during unwinding.
#[derive(Debug)]
pub struct GatePass<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> GatePass<'_, T> {
    /// Release the slot now
    pub fn exit(self) {}
}

impl<T> Deref for GatePass<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for GatePass<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};

    #[test]
    fn test_second_entry_refused_until_exit() {
        let gate = ConcurrencyGate::new(0u32);

        let pass = gate.try_enter().expect("first entry");
        assert!(gate.is_busy());
        assert!(gate.try_enter().is_none());
        assert!(gate.try_enter().is_none());

        pass.exit();
        assert!(!gate.is_busy());
        assert!(gate.try_enter().is_some());

        assert_eq!(gate.admitted(), 2);
        assert_eq!(gate.dropped(), 2);
    }

    #[test]
    fn test_pass_gives_access_to_state() {
        let gate = ConcurrencyGate::new(Vec::<u8>::new());
        {
            let mut pass = gate.try_enter().unwrap();
            pass.push(1);
        }
        assert_eq!(gate.into_inner(), vec![1]);
    }

    #[test]
    fn test_slot_released_on_panic() {
        let gate = ConcurrencyGate::new(());
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _pass = gate.try_enter().unwrap();
            panic!("processing failed");
        }));
        assert!(result.is_err());
        assert!(gate.try_enter().is_some());
    }

    #[test]
    fn test_refused_from_other_thread() {
        let gate = ConcurrencyGate::new(());
        let _pass = gate.try_enter().unwrap();
        std::thread::scope(|s| {
            s.spawn(|| assert!(gate.try_enter().is_none()));
        });
    }
}
