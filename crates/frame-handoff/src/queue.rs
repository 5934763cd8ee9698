//! Processed-frame queue: unbounded MPSC FIFO with a stop sentinel

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::HandoffError;

/// Queue entry. `Stop` unblocks a consumer waiting in `recv`.
#[derive(Debug)]
enum Entry<T> {
    Item(T),
    Stop,
}

/// Create a processed-frame queue
pub fn processed_queue<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    (
        QueueSender {
            tx,
            pending: pending.clone(),
        },
        QueueReceiver {
            rx,
            pending,
            stopped: false,
        },
    )
}

/// Producer half. Cloneable; pushes never block.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::UnboundedSender<Entry<T>>,
    pending: Arc<AtomicUsize>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            pending: self.pending.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Append an item
    pub fn push(&self, item: T) -> Result<(), HandoffError> {
        // Count before sending so the consumer never decrements below zero
        self.pending.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(Entry::Item(item)).is_err() {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            return Err(HandoffError::Closed);
        }
        Ok(())
    }

    /// Push the stop sentinel. Items queued before it are still delivered.
    pub fn stop(&self) -> Result<(), HandoffError> {
        debug!("Pushing stop sentinel to processed queue");
        self.tx.send(Entry::Stop).map_err(|_| HandoffError::Closed)
    }

    /// Items pushed but not yet received
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Whether the consumer is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: mpsc::UnboundedReceiver<Entry<T>>,
    pending: Arc<AtomicUsize>,
    stopped: bool,
}

impl<T> QueueReceiver<T> {
    /// Wait for the next item. Returns `None` once the stop sentinel is
    /// reached or every sender has been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        if self.stopped {
            return None;
        }
        let entry = self.rx.recv().await;
        self.accept(entry)
    }

    /// Blocking variant of `recv` for consumers on plain threads.
    /// Must not be called from within an async context.
    pub fn blocking_recv(&mut self) -> Option<T> {
        if self.stopped {
            return None;
        }
        let entry = self.rx.blocking_recv();
        self.accept(entry)
    }

    /// Non-blocking pop; `None` if the queue is empty or stopped
    pub fn try_recv(&mut self) -> Option<T> {
        if self.stopped {
            return None;
        }
        let entry = self.rx.try_recv().ok();
        match entry {
            Some(entry) => self.accept(Some(entry)),
            None => None,
        }
    }

    /// Whether the stop sentinel has been received
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn accept(&mut self, entry: Option<Entry<T>>) -> Option<T> {
        match entry {
            Some(Entry::Item(item)) => {
                self.pending.fetch_sub(1, Ordering::Relaxed);
                Some(item)
            }
            Some(Entry::Stop) | None => {
                self.stopped = true;
                None
            }
        }
    }
}
