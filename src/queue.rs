//! Unbounded message queue with cancellable asynchronous dequeue
//!
//! Every entry in the queue is either a value waiting for a consumer or a
//! consumer waiting for a value, never a mix of both. A consumer that finds
//! no value leaves a waiting placeholder holding the sending half of a
//! oneshot channel; the next producer hands its value straight through that
//! placeholder, so the value never sits in the queue.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use tokio_util::sync::CancellationToken;
use crate::error::DequeueError;

enum Entry<T> {
    /// Value enqueued before any consumer asked for it
    Ready(T),
    /// Consumer suspended until a value arrives
    Waiting { id: u64, slot: oneshot::Sender<T> },
}

struct State<T> {
    entries: VecDeque<Entry<T>>,
    next_waiter: u64,
}

/// FIFO queue shared by any number of producers and one consumer at a time
pub struct MessageQueue<T> {
    state: Mutex<State<T>>,
}

impl<T> MessageQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                entries: VecDeque::new(),
                next_waiter: 0,
            }),
        }
    }

    /// Add a value to the queue
    ///
    /// Never blocks. If a consumer is waiting, the value is handed to the
    /// oldest one directly.
    pub fn enqueue(&self, mut value: T) {
        let mut state = self.state.lock();

        loop {
            match state.entries.pop_front() {
                Some(Entry::Waiting { slot, .. }) => match slot.send(value) {
                    Ok(()) => return,
                    // The waiting dequeue was dropped; try the next waiter or keep the value.
                    Err(returned) => value = returned,
                },
                Some(ready) => {
                    state.entries.push_front(ready);
                    break;
                }
                None => break,
            }
        }

        state.entries.push_back(Entry::Ready(value));
    }

    /// Take the oldest value, waiting for one if the queue is empty
    ///
    /// Returns `DequeueError::Cancelled` if `cancel` fires before a value is
    /// delivered. Cancellation and delivery are decided under the queue lock,
    /// so a wait never yields both.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Result<T, DequeueError> {
        let (id, mut delivery) = {
            let mut state = self.state.lock();

            match state.entries.pop_front() {
                Some(Entry::Ready(value)) => return Ok(value),
                Some(waiting) => state.entries.push_front(waiting),
                None => {}
            }

            if cancel.is_cancelled() {
                return Err(DequeueError::Cancelled);
            }

            let id = state.next_waiter;
            state.next_waiter = state.next_waiter.wrapping_add(1);

            let (slot, delivery) = oneshot::channel();
            state.entries.push_back(Entry::Waiting { id, slot });
            (id, delivery)
        };

        tokio::select! {
            biased;
            delivered = &mut delivery => return delivered.map_err(|_| DequeueError::Closed),
            () = cancel.cancelled() => {}
        }

        self.try_cancel(id, delivery)
    }

    /// Withdraw waiter `id`, unless a producer already fulfilled it
    fn try_cancel(&self, id: u64, mut delivery: oneshot::Receiver<T>) -> Result<T, DequeueError> {
        let mut state = self.state.lock();

        let position = state.entries.iter().position(|entry| {
            matches!(entry, Entry::Waiting { id: waiting, .. } if *waiting == id)
        });

        match position {
            Some(index) => {
                state.entries.remove(index);
                Err(DequeueError::Cancelled)
            }
            // Fulfilled under the lock before we got here: the value is already in the channel.
            None => delivery.try_recv().map_err(|_| DequeueError::Closed),
        }
    }

    /// Number of entries, counting both queued values and waiting consumers
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for MessageQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueue").field("len", &self.len()).finish()
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
