//! Hand-off between the thread that decodes frames and the thread that
//! redraws.
//!
//! The decoder publishes a complete snapshot and the redraw side picks up the
//! newest one. Publishing swaps a pointer under the lock, so the reader never
//! observes a half-applied frame and neither side waits on the other's work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

struct Shared<T> {
    front: Mutex<Arc<T>>,
    generation: AtomicU64,
}

/// Writing half. There is exactly one per hand-off.
pub struct Publisher<T> {
    shared: Arc<Shared<T>>,
}

/// Reading half. There is exactly one per hand-off.
pub struct Subscriber<T> {
    shared: Arc<Shared<T>>,
    seen: u64,
}

pub fn handoff<T>(initial: T) -> (Publisher<T>, Subscriber<T>) {
    let shared = Arc::new(Shared {
        front: Mutex::new(Arc::new(initial)),
        generation: AtomicU64::new(0),
    });
    (
        Publisher {
            shared: Arc::clone(&shared),
        },
        Subscriber { shared, seen: 0 },
    )
}

impl<T> Publisher<T> {
    /// Make `value` the current snapshot. Returns the snapshot it replaced.
    pub fn publish(&mut self, value: T) -> Arc<T> {
        let previous = std::mem::replace(&mut *self.shared.front.lock(), Arc::new(value));
        self.shared.generation.fetch_add(1, Ordering::Release);
        previous
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }
}

impl<T> Subscriber<T> {
    /// The current snapshot, whether or not it was seen before.
    pub fn current(&mut self) -> Arc<T> {
        let front = Arc::clone(&*self.shared.front.lock());
        self.seen = self.shared.generation.load(Ordering::Acquire);
        front
    }

    /// The current snapshot if something was published since the last read.
    pub fn latest(&mut self) -> Option<Arc<T>> {
        if self.shared.generation.load(Ordering::Acquire) == self.seen {
            return None;
        }
        Some(self.current())
    }
}
