//! Bridge event fan-out.
//!
//! Every subscriber gets its own unbounded channel, so a slow consumer never
//! stalls the bridge or other subscribers. Dropping a [`Subscription`]
//! unsubscribes it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::common::command::ParsedCommand;
use crate::common::messages::ChatMessage;

/// Events raised by a bridge.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A connection attempt started.
    Connect,
    /// The player spawned; chat is possible.
    Ready,
    /// The session ended.
    Disconnect(String),
    Message(Arc<ChatMessage>),
    /// An in-game line carried a command.
    Command {
        message: Arc<ChatMessage>,
        command: ParsedCommand,
    },
    Error(String),
}

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<BridgeEvent>>>,
}

/// Subscriber registry for one bridge.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, tx);
        Subscription {
            id,
            rx,
            hub: self.clone(),
        }
    }

    /// Deliver to every live subscriber, pruning closed ones.
    pub fn emit(&self, event: BridgeEvent) {
        self.lock().retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn unsubscribe(&self, id: u64) {
        self.lock().remove(&id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<BridgeEvent>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// A live subscription. Unsubscribes on drop.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<BridgeEvent>,
    hub: EventHub,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BridgeEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_and_unsubscribe_on_drop() {
        let hub = EventHub::new();
        let mut a = hub.subscribe();
        let b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        hub.emit(BridgeEvent::Ready);
        assert!(matches!(a.recv().await, Some(BridgeEvent::Ready)));

        drop(b);
        assert_eq!(hub.subscriber_count(), 1);

        hub.emit(BridgeEvent::Disconnect("manual".to_string()));
        match a.recv().await {
            Some(BridgeEvent::Disconnect(reason)) => assert_eq!(reason, "manual"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
