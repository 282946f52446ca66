//! Bounded Handoff Queue
//!
//! Capacity-bounded FIFO used for every pool in the admission engine:
//! per-tenant in-flight slots, per-tenant wait queues and the global
//! backlog pool.
//!
//! - `try_push` / `try_pop` never wait
//! - `push` / `pop` wait for room / for an item
//! - `close` stops new pushes; `pop` keeps returning queued items until the
//!   queue is drained, then returns `None`

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Error returned by [`BoundedQueue::try_push`]. The rejected item is handed back.
pub enum PushError<T> {
    /// Queue is at capacity
    Full(T),
    /// Queue has been closed
    Closed(T),
}

impl<T> PushError<T> {
    /// Recover the item that could not be pushed
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, PushError::Full(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => write!(f, "Full(..)"),
            PushError::Closed(_) => write!(f, "Closed(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => write!(f, "queue is full"),
            PushError::Closed(_) => write!(f, "queue is closed"),
        }
    }
}

impl<T> std::error::Error for PushError<T> {}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Capacity-bounded FIFO with blocking and non-blocking ends
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Create a queue pre-filled to capacity with items produced by `make`
    pub fn filled(capacity: usize, mut make: impl FnMut() -> T) -> Self {
        let queue = Self::new(capacity);
        {
            let mut state = queue.state.lock();
            state.items.extend((0..capacity).map(|_| make()));
        }
        queue
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Push without waiting
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(PushError::Closed(item));
            }
            if state.items.len() >= self.capacity {
                return Err(PushError::Full(item));
            }
            state.items.push_back(item);
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Push, waiting for room if the queue is full.
    ///
    /// Returns the item back if the queue is (or becomes) closed.
    pub async fn push(&self, mut item: T) -> Result<(), T> {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_push(item) {
                Ok(()) => return Ok(()),
                Err(PushError::Closed(rejected)) => return Err(rejected),
                Err(PushError::Full(rejected)) => item = rejected,
            }

            notified.await;
        }
    }

    /// Pop without waiting
    pub fn try_pop(&self) -> Option<T> {
        let item = self.state.lock().items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Pop, waiting for an item if the queue is empty.
    ///
    /// Returns `None` only once the queue is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Refuse further pushes and wake every waiter
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedQueue")
            .field("len", &state.items.len())
            .field("capacity", &self.capacity)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_try_push_respects_capacity() {
        let queue = BoundedQueue::new(2);
        assert!(queue.try_push(1).is_ok());
        assert!(queue.try_push(2).is_ok());

        let err = queue.try_push(3).unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_inner(), 3);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(4);
        for i in 0..4 {
            queue.try_push(i).unwrap();
        }
        let drained: Vec<_> = std::iter::from_fn(|| queue.try_pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_filled() {
        let queue = BoundedQueue::filled(3, || ());
        assert_eq!(queue.len(), 3);
        assert!(queue.try_push(()).unwrap_err().is_full());
    }

    #[test]
    fn test_closed_rejects_push() {
        let queue = BoundedQueue::new(1);
        queue.close();
        assert!(matches!(queue.try_push(7), Err(PushError::Closed(7))));
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(BoundedQueue::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.try_push("item").unwrap();

        assert_eq!(consumer.await.unwrap(), Some("item"));
    }

    #[tokio::test]
    async fn test_push_waits_for_room() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.try_push(1).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(2).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!producer.is_finished());

        assert_eq!(queue.try_pop(), Some(1));
        producer.await.unwrap().unwrap();
        assert_eq!(queue.try_pop(), Some(2));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = BoundedQueue::new(2);
        queue.try_push('a').unwrap();
        queue.close();

        assert_eq!(queue.pop().await, Some('a'));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_pop() {
        let queue: Arc<BoundedQueue<u8>> = Arc::new(BoundedQueue::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        assert_eq!(consumer.await.unwrap(), None);
    }
}
