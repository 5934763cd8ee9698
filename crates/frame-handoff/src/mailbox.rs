//! Latest-wins single-slot mailbox

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Single-slot mailbox. Every write replaces the previous value; readers
/// copy out a shared handle to whatever is newest. There is no queueing:
/// values written between two reads are never observed.
pub struct FrameMailbox<T> {
    /// The slot (`None` until the first write)
    slot: Mutex<Option<Arc<T>>>,
    /// Total values written (for statistics)
    total_written: AtomicUsize,
}

impl<T> FrameMailbox<T> {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            total_written: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<T>>> {
        // The slot holds a complete value or nothing, so a poisoned lock is still usable.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a value, replacing any unread one
    pub fn write(&self, value: T) {
        let value = Arc::new(value);
        let previous = self.lock().replace(value);
        self.total_written.fetch_add(1, Ordering::Relaxed);
        // Drop the displaced value outside the lock
        drop(previous);
    }

    /// Copy out the newest value without clearing the slot.
    /// The same value is returned again until the next write.
    pub fn read(&self) -> Option<Arc<T>> {
        self.lock().as_ref().map(Arc::clone)
    }

    /// Take the newest value, leaving the slot empty
    pub fn take(&self) -> Option<Arc<T>> {
        self.lock().take()
    }

    /// Whether the slot currently holds a value
    pub fn is_valid(&self) -> bool {
        self.lock().is_some()
    }

    /// Get total values written (for statistics)
    pub fn total_written(&self) -> usize {
        self.total_written.load(Ordering::Relaxed)
    }
}

impl<T> Default for FrameMailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_mailbox() {
        let mailbox: FrameMailbox<u32> = FrameMailbox::new();
        assert!(!mailbox.is_valid());
        assert!(mailbox.read().is_none());
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn test_newest_write_wins() {
        let mailbox = FrameMailbox::new();
        mailbox.write(1);
        mailbox.write(2);
        mailbox.write(3);

        assert_eq!(mailbox.read().as_deref(), Some(&3));
        assert_eq!(mailbox.total_written(), 3);
    }

    #[test]
    fn test_read_repeats_until_next_write() {
        let mailbox = FrameMailbox::new();
        mailbox.write("a");
        assert_eq!(mailbox.read().as_deref(), Some(&"a"));
        assert_eq!(mailbox.read().as_deref(), Some(&"a"));

        mailbox.write("b");
        assert_eq!(mailbox.read().as_deref(), Some(&"b"));
    }

    #[test]
    fn test_take_empties_slot() {
        let mailbox = FrameMailbox::new();
        mailbox.write(7);
        assert_eq!(mailbox.take().as_deref(), Some(&7));
        assert!(!mailbox.is_valid());
        assert!(mailbox.read().is_none());
    }

    #[test]
    fn test_concurrent_writers_leave_a_complete_value() {
        let mailbox = Arc::new(FrameMailbox::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let mailbox = mailbox.clone();
                std::thread::spawn(move || {
                    for i in 0..100u32 {
                        mailbox.write(vec![t * 1000 + i; 64]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let value = mailbox.read().unwrap();
        assert!(value.iter().all(|v| *v == value[0]));
        assert_eq!(mailbox.total_written(), 400);
    }

    proptest! {
        #[test]
        fn prop_read_returns_last_write(values in proptest::collection::vec(any::<u64>(), 1..50)) {
            let mailbox = FrameMailbox::new();
            for v in &values {
                mailbox.write(*v);
            }
            let read = mailbox.read();
            prop_assert_eq!(read.as_deref(), values.last());
        }
    }
}
