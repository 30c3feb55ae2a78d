use std::any::Any;

use parking_lot::{Condvar, Mutex};

/// Counting semaphore bounding how many workers run at once.
///
/// Callers acquire before spawning a worker and hand the permit to it; the
/// permit is released when the worker drops it, including on unwind.
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits.max(1)),
            available: Condvar::new(),
        }
    }

    /// Block until a permit is free.
    pub fn acquire(&self) -> SemaphorePermit<'_> {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
        SemaphorePermit { semaphore: self }
    }

    pub fn available_permits(&self) -> usize {
        *self.permits.lock()
    }

    fn release(&self) {
        *self.permits.lock() += 1;
        self.available.notify_one();
    }
}

#[must_use = "dropping the permit releases it immediately"]
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

/// Text of a panic payload caught at a join barrier.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_permits_return_on_drop() {
        let sem = Semaphore::new(2);
        let a = sem.acquire();
        let b = sem.acquire();
        assert_eq!(sem.available_permits(), 0);
        drop(a);
        assert_eq!(sem.available_permits(), 1);
        drop(b);
        assert_eq!(sem.available_permits(), 2);
    }

    #[test]
    fn test_zero_is_clamped_to_one() {
        let sem = Semaphore::new(0);
        let _p = sem.acquire();
        assert_eq!(sem.available_permits(), 0);
    }

    #[test]
    fn test_bounds_concurrency() {
        let sem = Semaphore::new(3);
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..12 {
                let permit = sem.acquire();
                let running = &running;
                let peak = &peak;
                s.spawn(move || {
                    let _permit = permit;
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    running.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(sem.available_permits(), 3);
    }

    #[test]
    fn test_panicking_holder_releases() {
        let sem = Semaphore::new(1);
        thread::scope(|s| {
            let permit = sem.acquire();
            let handle = s.spawn(move || {
                let _permit = permit;
                panic!("worker failed");
            });
            let payload = handle.join().unwrap_err();
            assert_eq!(panic_message(&*payload), "worker failed");
        });
        assert_eq!(sem.available_permits(), 1);
    }
}
