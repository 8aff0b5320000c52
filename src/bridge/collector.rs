//! Filtered, bounded collection over a bridge's event stream.
//!
//! Each collector runs as its own task over its own subscription. Matching
//! messages are appended to the collected list and published to the consumer
//! in order. The collector ends on a limit, a timer, a bridge disconnect or an
//! explicit stop, and unsubscribes when it ends.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::debug;

use crate::bridge::events::{BridgeEvent, Subscription};
use crate::common::messages::ChatMessage;

/// Limits and timers for a collector. `None` disables a bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorOptions {
    /// Total lifetime.
    pub time: Option<Duration>,
    /// Longest gap between collected messages.
    pub idle: Option<Duration>,
    /// Stop after this many collected messages.
    pub max: Option<usize>,
    /// Stop after this many received messages, matched or not.
    pub max_processed: Option<usize>,
}

impl CollectorOptions {
    pub fn with_time(mut self, time: Duration) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = Some(idle);
        self
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_max_processed(mut self, max_processed: usize) -> Self {
        self.max_processed = Some(max_processed);
        self
    }
}

/// Why a collector ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Limit,
    ProcessedLimit,
    Time,
    Idle,
    Disconnect,
    User,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndReason::Limit => "limit",
            EndReason::ProcessedLimit => "processedLimit",
            EndReason::Time => "time",
            EndReason::Idle => "idle",
            EndReason::Disconnect => "disconnect",
            EndReason::User => "user",
        };
        f.write_str(name)
    }
}

/// Returned by [`MessageCollector::next`] once everything was consumed.
#[derive(Debug, Clone, Error)]
#[error("collector ended ({reason}) after {} messages", collected.len())]
pub struct CollectorEnded {
    pub collected: Vec<Arc<ChatMessage>>,
    pub reason: EndReason,
}

/// Decides whether a message is collected.
#[async_trait]
pub trait CollectorFilter: Send + Sync + 'static {
    async fn accept(&self, message: &Arc<ChatMessage>, collected: &[Arc<ChatMessage>]) -> bool;
}

#[async_trait]
impl<F> CollectorFilter for F
where
    F: Fn(&ChatMessage, &[Arc<ChatMessage>]) -> bool + Send + Sync + 'static,
{
    async fn accept(&self, message: &Arc<ChatMessage>, collected: &[Arc<ChatMessage>]) -> bool {
        self(message, collected)
    }
}

/// Adapter for filters that need to await.
pub struct AsyncFilter<F>(pub F);

#[async_trait]
impl<F, Fut> CollectorFilter for AsyncFilter<F>
where
    F: Fn(Arc<ChatMessage>, Vec<Arc<ChatMessage>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send,
{
    async fn accept(&self, message: &Arc<ChatMessage>, collected: &[Arc<ChatMessage>]) -> bool {
        (self.0)(message.clone(), collected.to_vec()).await
    }
}

enum Control {
    Stop,
    ResetTimer {
        time: Option<Duration>,
        idle: Option<Duration>,
    },
}

#[derive(Default)]
struct Shared {
    collected: Vec<Arc<ChatMessage>>,
    received: usize,
    reason: Option<EndReason>,
}

/// A running collector.
pub struct MessageCollector {
    items: mpsc::UnboundedReceiver<Arc<ChatMessage>>,
    control: mpsc::UnboundedSender<Control>,
    shared: Arc<Mutex<Shared>>,
    ended: watch::Receiver<Option<EndReason>>,
}

impl MessageCollector {
    /// Start collecting from `subscription`.
    pub fn spawn(
        subscription: Subscription,
        filter: impl CollectorFilter,
        options: CollectorOptions,
    ) -> Self {
        let (items_tx, items) = mpsc::unbounded_channel();
        let (control, control_rx) = mpsc::unbounded_channel();
        let (ended_tx, ended) = watch::channel(None);
        let shared = Arc::new(Mutex::new(Shared::default()));

        let task = CollectorTask {
            subscription,
            filter: Box::new(filter),
            options,
            items: items_tx,
            control: control_rx,
            shared: shared.clone(),
            buffered: VecDeque::new(),
            time_deadline: options.time.map(|t| Instant::now() + t),
            idle_deadline: options.idle.map(|t| Instant::now() + t),
        };
        tokio::spawn(async move {
            let reason = task.run(ended_tx).await;
            debug!(%reason, "Collector ended");
        });

        Self {
            items,
            control,
            shared,
            ended,
        }
    }

    /// Next collected message, in order.
    pub async fn next(&mut self) -> Result<Arc<ChatMessage>, CollectorEnded> {
        match self.items.recv().await {
            Some(message) => Ok(message),
            None => Err(CollectorEnded {
                collected: self.collected(),
                reason: self.wait_reason().await,
            }),
        }
    }

    /// Every collected message as a stream, ending with the collector.
    pub fn into_stream(self) -> impl Stream<Item = Arc<ChatMessage>> {
        futures::stream::unfold(self, |mut collector| async move {
            collector.next().await.ok().map(|m| (m, collector))
        })
    }

    /// Wait for the end and return everything collected.
    pub async fn finished(&mut self) -> (Vec<Arc<ChatMessage>>, EndReason) {
        let reason = self.wait_reason().await;
        (self.collected(), reason)
    }

    /// End the collector now. Idempotent.
    pub fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }

    /// Restart the given timers from now without losing collected state.
    pub fn reset_timer(&self, time: Option<Duration>, idle: Option<Duration>) {
        let _ = self.control.send(Control::ResetTimer { time, idle });
    }

    pub fn collected(&self) -> Vec<Arc<ChatMessage>> {
        self.lock().collected.clone()
    }

    pub fn received(&self) -> usize {
        self.lock().received
    }

    /// End reason, if already ended.
    pub fn ended(&self) -> Option<EndReason> {
        self.lock().reason
    }

    async fn wait_reason(&mut self) -> EndReason {
        let reported = match self.ended.wait_for(Option::is_some).await {
            Ok(reason) => *reason,
            // Task vanished without reporting.
            Err(_) => None,
        };
        reported.or_else(|| self.ended()).unwrap_or(EndReason::User)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What interrupted a wait.
enum Interrupt {
    End(EndReason),
    Event(BridgeEvent),
}

struct CollectorTask {
    subscription: Subscription,
    filter: Box<dyn CollectorFilter>,
    options: CollectorOptions,
    items: mpsc::UnboundedSender<Arc<ChatMessage>>,
    control: mpsc::UnboundedReceiver<Control>,
    shared: Arc<Mutex<Shared>>,
    /// Events read ahead while a filter was running.
    buffered: VecDeque<BridgeEvent>,
    time_deadline: Option<Instant>,
    idle_deadline: Option<Instant>,
}

impl CollectorTask {
    async fn run(mut self, ended: watch::Sender<Option<EndReason>>) -> EndReason {
        let reason = self.collect().await;

        {
            let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            shared.reason = Some(reason);
        }
        let _ = ended.send(Some(reason));
        // Dropping self closes the item channel and unsubscribes.
        drop(self);
        reason
    }

    async fn collect(&mut self) -> EndReason {
        if self.options.max == Some(0) {
            return EndReason::Limit;
        }
        if self.options.max_processed == Some(0) {
            return EndReason::ProcessedLimit;
        }

        loop {
            let event = match self.buffered.pop_front() {
                Some(event) => event,
                None => match self.wait_event().await {
                    Interrupt::Event(event) => event,
                    Interrupt::End(reason) => return reason,
                },
            };

            let message = match event {
                BridgeEvent::Disconnect(_) => return EndReason::Disconnect,
                BridgeEvent::Message(message) => message,
                _ => continue,
            };

            let (received, snapshot) = {
                let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
                shared.received += 1;
                (shared.received, shared.collected.clone())
            };

            let accepted = match self.evaluate(&message, &snapshot).await {
                Ok(accepted) => accepted,
                Err(reason) => return reason,
            };

            if accepted {
                let collected = {
                    let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
                    shared.collected.push(message.clone());
                    shared.collected.len()
                };
                let _ = self.items.send(message);
                self.idle_deadline = self.options.idle.map(|t| Instant::now() + t);

                if self.options.max.is_some_and(|max| collected >= max) {
                    return EndReason::Limit;
                }
            }

            if self
                .options
                .max_processed
                .is_some_and(|max| received >= max)
            {
                return EndReason::ProcessedLimit;
            }
        }
    }

    /// Run the filter while still watching for events that end the collector.
    async fn evaluate(
        &mut self,
        message: &Arc<ChatMessage>,
        snapshot: &[Arc<ChatMessage>],
    ) -> Result<bool, EndReason> {
        let filter = &self.filter;
        let evaluation = filter.accept(message, snapshot);
        tokio::pin!(evaluation);

        loop {
            tokio::select! {
                biased;
                accepted = &mut evaluation => return Ok(accepted),
                interrupt = wait_interrupt(
                    &mut self.subscription,
                    &mut self.control,
                    &mut self.time_deadline,
                    &mut self.idle_deadline,
                    self.options,
                ) => match interrupt {
                    Interrupt::End(reason) => return Err(reason),
                    Interrupt::Event(BridgeEvent::Disconnect(_)) => return Err(EndReason::Disconnect),
                    Interrupt::Event(event) => self.buffered.push_back(event),
                },
            }
        }
    }

    async fn wait_event(&mut self) -> Interrupt {
        wait_interrupt(
            &mut self.subscription,
            &mut self.control,
            &mut self.time_deadline,
            &mut self.idle_deadline,
            self.options,
        )
        .await
    }
}

/// Wait for the next event, control message or timer.
async fn wait_interrupt(
    subscription: &mut Subscription,
    control: &mut mpsc::UnboundedReceiver<Control>,
    time_deadline: &mut Option<Instant>,
    idle_deadline: &mut Option<Instant>,
    options: CollectorOptions,
) -> Interrupt {
    loop {
        tokio::select! {
            biased;
            command = control.recv() => match command {
                // A dropped handle counts as a stop.
                Some(Control::Stop) | None => return Interrupt::End(EndReason::User),
                Some(Control::ResetTimer { time, idle }) => {
                    if let Some(time) = time.or(options.time) {
                        *time_deadline = Some(Instant::now() + time);
                    }
                    if let Some(idle) = idle.or(options.idle) {
                        *idle_deadline = Some(Instant::now() + idle);
                    }
                }
            },
            _ = sleep_until(*time_deadline) => return Interrupt::End(EndReason::Time),
            _ = sleep_until(*idle_deadline) => return Interrupt::End(EndReason::Idle),
            event = subscription.recv() => match event {
                Some(event) => return Interrupt::Event(event),
                // The bridge itself is gone.
                None => return Interrupt::End(EndReason::Disconnect),
            },
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::bridge::events::EventHub;
    use crate::common::directory::StaticPlayerDirectory;
    use crate::game::parser::ChatLineParser;

    fn message(line: &str) -> BridgeEvent {
        let parser = ChatLineParser::new("BridgeBot", Arc::new(StaticPlayerDirectory::new(vec![])));
        BridgeEvent::Message(Arc::new(parser.parse(line)))
    }

    fn system_only(message: &ChatMessage, _collected: &[Arc<ChatMessage>]) -> bool {
        message.is_system()
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_reached() {
        let hub = EventHub::new();
        let mut collector = MessageCollector::spawn(
            hub.subscribe(),
            system_only,
            CollectorOptions::default().with_max(2),
        );

        hub.emit(message("Guild > Steve: ignored"));
        hub.emit(message("Online Members: 5"));
        hub.emit(message("Offline Members: 2"));
        hub.emit(message("Too late"));

        let (collected, reason) = collector.finished().await;
        assert_eq!(reason, EndReason::Limit);
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1].content, "Offline Members: 2");
        assert_eq!(collector.received(), 3);
        // Unsubscribed after ending.
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_processed_limit() {
        let hub = EventHub::new();
        let mut collector = MessageCollector::spawn(
            hub.subscribe(),
            system_only,
            CollectorOptions::default().with_max_processed(2),
        );
        hub.emit(message("Guild > Steve: a"));
        hub.emit(message("Guild > Steve: b"));

        let (collected, reason) = collector.finished().await;
        assert_eq!(reason, EndReason::ProcessedLimit);
        assert!(collected.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_and_idle() {
        let hub = EventHub::new();
        let mut timed = MessageCollector::spawn(
            hub.subscribe(),
            system_only,
            CollectorOptions::default().with_time(Duration::from_secs(5)),
        );
        let (_, reason) = timed.finished().await;
        assert_eq!(reason, EndReason::Time);

        let mut idle = MessageCollector::spawn(
            hub.subscribe(),
            system_only,
            CollectorOptions::default()
                .with_time(Duration::from_secs(60))
                .with_idle(Duration::from_secs(2)),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        hub.emit(message("line one"));
        let first = idle.next().await.unwrap();
        assert_eq!(first.content, "line one");
        let ended = idle.next().await.unwrap_err();
        assert_eq!(ended.reason, EndReason::Idle);
        assert_eq!(ended.collected.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_collector_never_ends_on_its_own() {
        let hub = EventHub::new();
        let mut collector =
            MessageCollector::spawn(hub.subscribe(), system_only, CollectorOptions::default());

        hub.emit(message("first"));
        tokio::time::sleep(Duration::from_secs(3600)).await;
        hub.emit(message("an hour later"));
        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;

        assert_eq!(collector.ended(), None);
        assert_eq!(collector.received(), 2);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(collector.next().await.unwrap().content, "first");
        assert_eq!(collector.next().await.unwrap().content, "an hour later");

        collector.stop();
        let (collected, reason) = collector.finished().await;
        assert_eq!(reason, EndReason::User);
        assert_eq!(collected.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_mid_evaluation_ends_immediately() {
        let hub = EventHub::new();
        let slow = AsyncFilter(|_message: Arc<ChatMessage>, _collected: Vec<Arc<ChatMessage>>| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            true
        });
        let mut collector = MessageCollector::spawn(hub.subscribe(), slow, CollectorOptions::default());

        hub.emit(message("first"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        hub.emit(BridgeEvent::Disconnect("kicked".to_string()));

        let started = Instant::now();
        let (collected, reason) = collector.finished().await;
        assert_eq!(reason, EndReason::Disconnect);
        assert!(collected.is_empty());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_drop_unsubscribes() {
        let hub = EventHub::new();
        let mut collector = MessageCollector::spawn(hub.subscribe(), system_only, CollectorOptions::default());
        collector.stop();
        collector.stop();
        let (_, reason) = collector.finished().await;
        assert_eq!(reason, EndReason::User);
        assert_eq!(collector.ended(), Some(EndReason::User));

        let dropped = MessageCollector::spawn(hub.subscribe(), system_only, CollectorOptions::default());
        assert_eq!(hub.subscriber_count(), 1);
        drop(dropped);
        while hub.subscriber_count() > 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_yields_everything_in_order() {
        let hub = EventHub::new();
        let collector = MessageCollector::spawn(
            hub.subscribe(),
            system_only,
            CollectorOptions::default().with_max(3),
        );
        for line in ["one", "Guild > Steve: skip", "two", "three"] {
            hub.emit(message(line));
        }
        let contents: Vec<String> = collector
            .into_stream()
            .map(|m| m.content.clone())
            .collect()
            .await;
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_timer_extends_window() {
        let hub = EventHub::new();
        let mut collector = MessageCollector::spawn(
            hub.subscribe(),
            system_only,
            CollectorOptions::default().with_time(Duration::from_secs(5)),
        );
        tokio::time::sleep(Duration::from_secs(4)).await;
        collector.reset_timer(Some(Duration::from_secs(5)), None);
        tokio::time::sleep(Duration::from_secs(3)).await;
        hub.emit(message("still open"));
        assert_eq!(collector.next().await.unwrap().content, "still open");
        let (_, reason) = collector.finished().await;
        assert_eq!(reason, EndReason::Time);
    }
}
