use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// An unbounded FIFO queue shared between the accept path (producer) and the server workers (consumers).
///
/// The lock only ever guards a push or a pop: idle consumers wait on a condition variable, which releases the lock
/// until a producer signals a new item or the queue gets closed.
#[derive(Debug)]
pub struct RequestQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
}

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append `item` and wake up one idle consumer.
    ///
    /// Once the queue is closed, the item is handed back instead.
    pub fn enqueue(&self, item: T) -> Result<(), T> {
        let mut state = self.state.lock();

        if state.closed {
            return Err(item);
        }

        state.items.push_back(item);
        drop(state);

        self.available.notify_one();

        Ok(())
    }

    /// Remove and return the head of the queue, or `None` right away when it is empty.
    pub fn dequeue(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Remove and return the head of the queue, blocking while it is empty.
    ///
    /// Returns `None` once the queue is closed: pending items are then left behind, never delivered.
    pub fn recv(&self) -> Option<T> {
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return None;
            }

            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }

            self.available.wait(&mut state);
        }
    }

    /// Close the queue, waking up every waiting consumer and dropping pending items.
    pub fn close(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.items)
        };

        self.available.notify_all();

        if !pending.is_empty() {
            tracing::debug!("Dropping {} pending requests", pending.len());
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}
