//! Packet arrival monitor used by blocking reads

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::Instant;

use crate::connection::PacketListener;

/// Sequence counter + condition variable woken by connection enqueues and by
/// invalidation.
///
/// A waiter snapshots the sequence before checking its predicate under the
/// reader's own lock, then releases that lock for the wait. Any wake-up
/// bumps the sequence, so a packet arriving between the check and the wait
/// is never missed, and other threads can use the reader while it waits.
#[derive(Debug, Default)]
pub(crate) struct Notifier {
    seq: Mutex<u64>,
    cond: Condvar,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Block until `ready` returns true or `deadline` passes. `guard` is
    /// unlocked while sleeping and held whenever `ready` runs. Returns the
    /// final value of `ready`.
    pub(crate) fn wait_until<T>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        deadline: Instant,
        mut ready: impl FnMut(&mut T) -> bool,
    ) -> bool {
        loop {
            let observed = *self.seq.lock();
            if ready(&mut **guard) {
                return true;
            }
            let timed_out = MutexGuard::unlocked(guard, || {
                let mut seq = self.seq.lock();
                while *seq == observed {
                    if self.cond.wait_until(&mut seq, deadline).timed_out() {
                        return true;
                    }
                }
                false
            });
            if timed_out {
                return ready(&mut **guard);
            }
        }
    }

    /// [`wait_until`](Self::wait_until) for callers without state of their own.
    pub(crate) fn wait(&self, deadline: Instant, mut ready: impl FnMut() -> bool) -> bool {
        let unit = Mutex::new(());
        let mut guard = unit.lock();
        self.wait_until(&mut guard, deadline, |_| ready())
    }

    /// Wake every waiter so it re-checks its predicate.
    pub(crate) fn wake(&self) {
        let mut seq = self.seq.lock();
        *seq = seq.wrapping_add(1);
        self.cond.notify_all();
    }
}

impl PacketListener for Notifier {
    fn packet_received(&self) {
        self.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn wakes_on_packet_received() {
        let notifier = Arc::new(Notifier::new());
        let state = Arc::new(Mutex::new(false));

        let producer = {
            let notifier = Arc::clone(&notifier);
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                *state.lock() = true;
                notifier.packet_received();
            })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut guard = state.lock();
        assert!(notifier.wait_until(&mut guard, deadline, |flag| *flag));
        drop(guard);
        producer.join().unwrap();
    }

    #[test]
    fn state_lock_is_released_while_waiting() {
        let notifier = Arc::new(Notifier::new());
        let state = Arc::new(Mutex::new(0u32));

        let other = {
            let notifier = Arc::clone(&notifier);
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                let started = Instant::now();
                *state.lock() += 1;
                notifier.wake();
                started.elapsed()
            })
        };

        let mut guard = state.lock();
        let deadline = Instant::now() + Duration::from_secs(5);
        assert!(notifier.wait_until(&mut guard, deadline, |count| *count > 0));
        drop(guard);
        assert!(other.join().unwrap() < Duration::from_secs(1));
    }

    #[test]
    fn times_out_with_final_check() {
        let notifier = Notifier::new();
        let state = Mutex::new(());
        let mut guard = state.lock();
        let start = Instant::now();
        assert!(!notifier.wait_until(&mut guard, start + Duration::from_millis(10), |_| false));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
