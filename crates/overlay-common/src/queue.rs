//! A capacity-bounded FIFO used for the two inter-thread handoffs between
//! the Forwarder and the Router (§5): blocking `put`, nonblocking `poll`.
//! Producers block on a full queue rather than drop, so packets never get
//! lost on the in-process hop.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// A bounded, multi-producer multi-consumer queue.
///
/// Cloning shares the same underlying channel (it is a handle, like
/// `crossbeam_channel::Sender`/`Receiver`).
pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        BoundedQueue {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        BoundedQueue { tx, rx }
    }

    /// Enqueue `item`, blocking until there is room. Only fails if every
    /// handle to the queue has been dropped, which should never happen
    /// while the owning threads are alive (§7: treat as fatal).
    pub fn put(&self, item: T) {
        self.tx
            .send(item)
            .expect("BoundedQueue::put: receiver side dropped");
    }

    /// Dequeue the next item without blocking, or `None` if empty.
    pub fn poll(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                panic!("BoundedQueue::poll: sender side dropped")
            }
        }
    }

    /// True iff a call to `poll` would return an item right now.
    pub fn has_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    /// True iff a call to `put` would not block right now.
    pub fn has_room(&self) -> bool {
        !self.tx.is_full()
    }
}
