//! FIFO admission with a single in-flight holder.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

#[derive(Default)]
struct QueueState {
    running: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Serializes operations in arrival order.
///
/// `enqueue` resolves when the caller is at the head; the returned
/// [`QueueSlot`] hands over to the next waiter when released or dropped.
#[derive(Clone, Default)]
pub struct SerialQueue {
    state: Arc<Mutex<QueueState>>,
}

impl SerialQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for our turn.
    pub async fn enqueue(&self) -> QueueSlot {
        let rx = {
            let mut state = self.lock();
            if !state.running {
                state.running = true;
                return QueueSlot::new(self.clone());
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        let mut waiting = Waiting {
            rx,
            queue: self.clone(),
            admitted: false,
        };
        // The sender is only dropped by a handover that already made us the
        // holder, so either outcome means it is our turn.
        let _ = (&mut waiting.rx).await;
        waiting.admitted = true;
        QueueSlot::new(self.clone())
    }

    /// Number of callers waiting behind the current holder.
    pub fn size(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Hand the slot to the next live waiter, or go idle.
    fn advance(&self) {
        let mut state = self.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
            // Waiter gave up before its turn.
        }
        state.running = false;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A waiter whose `enqueue` future may be dropped before it is admitted.
struct Waiting {
    rx: oneshot::Receiver<()>,
    queue: SerialQueue,
    admitted: bool,
}

impl Drop for Waiting {
    fn drop(&mut self) {
        if self.admitted {
            return;
        }
        // Close first so a later handover skips us.
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            // The turn arrived but nobody will take it.
            self.queue.advance();
        }
    }
}

/// Proof of holding the queue. Releases exactly once.
pub struct QueueSlot {
    queue: Option<SerialQueue>,
}

impl QueueSlot {
    fn new(queue: SerialQueue) -> Self {
        Self { queue: Some(queue) }
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(queue) = self.queue.take() {
            queue.advance();
        }
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        self.release_inner();
    }
}
