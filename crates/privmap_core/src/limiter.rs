//! Counting admission gate.

use parking_lot::{Condvar, Mutex};

/// Bounds how many callers hold a slot at once.
///
/// `acquire` blocks until a slot is free; the slot is returned when the
/// [`Permit`] is dropped.
///
/// # Examples
///
/// ```
/// use privmap_core::Limiter;
///
/// let limiter = Limiter::new(2);
/// let a = limiter.acquire();
/// let _b = limiter.acquire();
/// assert_eq!(limiter.in_use(), 2);
/// drop(a);
/// assert_eq!(limiter.in_use(), 1);
/// ```
#[derive(Debug)]
pub struct Limiter {
    capacity: usize,
    in_use: Mutex<usize>,
    freed: Condvar,
}

impl Limiter {
    /// Creates a gate with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            in_use: Mutex::new(0),
            freed: Condvar::new(),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        *self.in_use.lock()
    }

    /// Blocks until a slot is available and takes it.
    pub fn acquire(&self) -> Permit<'_> {
        let mut in_use = self.in_use.lock();
        while *in_use >= self.capacity {
            self.freed.wait(&mut in_use);
        }
        *in_use += 1;
        Permit { limiter: self }
    }

    fn release(&self) {
        let mut in_use = self.in_use.lock();
        *in_use -= 1;
        self.freed.notify_one();
    }
}

/// A held slot.
#[derive(Debug)]
pub struct Permit<'a> {
    limiter: &'a Limiter,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
