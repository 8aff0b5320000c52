//! Minecraft-bound sends with anti-spam padding and retry.
//!
//! The server rejects a line identical to one of the sender's recent lines.
//! Each chat part is padded with invisible characters up to the line budget,
//! sent, and then confirmed by watching for the echo of exactly what was sent.
//! A duplicate rejection retries with the padding scattered through the text.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::common::error::{BridgeError, BridgeResult};
use crate::common::messages::{ChatMessage, MessageClass, OutboundChatRequest};
use crate::common::types::max_line_length;
use crate::game::formatter::split_message;
use crate::game::invisible::{strip_invisible, InvisibleCharacterCodec, PaddingMode};
use crate::game::parser::strip_formatting;
use crate::game::session::SessionHandle;

/// Attempts per part, including the first.
pub const MAX_SEND_ATTEMPTS: u32 = 3;

/// Window over which unconfirmed sends raise the safety delay.
pub const RECENT_SEND_WINDOW: Duration = Duration::from_secs(10);

/// Cap on the adaptive multiplier applied to a safety delay.
const MAX_DELAY_FACTOR: u32 = 5;

/// Result of sending one request (all of its parts).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Every part was echoed back.
    Delivered,
    /// At least one part got no signal before the safety delay ran out.
    Unconfirmed,
    /// The server's content filter blocked a part.
    Blocked,
    /// A part kept hitting the duplicate filter.
    Rejected,
    /// No live session.
    NotConnected,
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Delivered | SendOutcome::Unconfirmed)
    }
}

/// Outcome of a single send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Echoed,
    SpamRejected,
    Blocked,
    Silent,
    Closed,
}

/// Server reaction matched against the pending send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSignal {
    Echo,
    Spam,
    Blocked,
}

struct PendingEntry {
    /// Body as sent, without the chat prefix.
    sent: String,
    tx: oneshot::Sender<ResponseSignal>,
}

/// At most one outstanding send awaiting its server reaction.
#[derive(Default)]
pub struct PendingResponse {
    slot: Mutex<Option<PendingEntry>>,
}

impl PendingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm for `sent`, replacing any previous entry.
    pub fn arm(&self, sent: &str) -> oneshot::Receiver<ResponseSignal> {
        let (tx, rx) = oneshot::channel();
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(PendingEntry {
            sent: sent.to_string(),
            tx,
        });
        rx
    }

    /// Offer an incoming line. Returns true if it resolved the pending send.
    pub fn offer(&self, message: &ChatMessage) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = slot.as_ref() else {
            return false;
        };

        let signal = if message.is_spam {
            ResponseSignal::Spam
        } else if message.is_blocked {
            ResponseSignal::Blocked
        } else if is_echo_of(message, &entry.sent) {
            ResponseSignal::Echo
        } else {
            return false;
        };

        if let Some(entry) = slot.take() {
            let _ = entry.tx.send(signal);
        }
        true
    }

    /// Drop the pending entry; its waiter sees the send as closed.
    pub fn cancel(&self) {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn is_armed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// Whether `message` is our own echo of `sent`.
fn is_echo_of(message: &ChatMessage, sent: &str) -> bool {
    if !message.is_from_self {
        return false;
    }
    let sent = sent.trim_end();
    // Padding survives in the raw text; formatting codes may not.
    if strip_formatting(&message.raw_text).trim_end().ends_with(sent) {
        return true;
    }
    let visible = strip_invisible(sent);
    !visible.trim().is_empty() && message.content == visible.trim()
}

/// Rolling count of recent unconfirmed sends.
#[derive(Debug, Default)]
pub struct RecentSends {
    sends: VecDeque<Instant>,
}

impl RecentSends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_send(&mut self) {
        self.sends.push_back(Instant::now());
    }

    /// Sends still inside the window.
    pub fn count(&mut self) -> u32 {
        let now = Instant::now();
        while let Some(front) = self.sends.front() {
            if now.duration_since(*front) >= RECENT_SEND_WINDOW {
                self.sends.pop_front();
            } else {
                break;
            }
        }
        self.sends.len() as u32
    }

    /// `base` scaled by recent volume.
    pub fn current_delay(&mut self, base: Duration) -> Duration {
        let factor = (1 + self.count()).min(MAX_DELAY_FACTOR);
        base * factor
    }
}

/// Expected server response latency per message class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyDelays {
    pub guild: Duration,
    pub officer: Duration,
    pub party: Duration,
    pub whisper: Duration,
    pub command: Duration,
}

impl Default for SafetyDelays {
    fn default() -> Self {
        Self {
            guild: Duration::from_millis(750),
            officer: Duration::from_millis(750),
            party: Duration::from_millis(750),
            whisper: Duration::from_millis(750),
            command: Duration::from_millis(500),
        }
    }
}

impl SafetyDelays {
    pub fn for_class(&self, class: MessageClass) -> Duration {
        match class {
            MessageClass::Guild => self.guild,
            MessageClass::Officer => self.officer,
            MessageClass::Party => self.party,
            MessageClass::Whisper => self.whisper,
            MessageClass::Chat => self.guild,
            MessageClass::Command => self.command,
        }
    }
}

/// Split request content into sendable parts.
///
/// Returns the parts and how many were dropped past `max_parts`.
pub fn prepare_parts(
    request: &OutboundChatRequest,
    protocol_version: i32,
) -> BridgeResult<(Vec<String>, usize)> {
    if request.max_parts == 0 {
        return Err(BridgeError::InvalidRequest(
            "max_parts must be at least 1".to_string(),
        ));
    }
    let content = request.content.trim();
    if content.is_empty() {
        return Err(BridgeError::InvalidRequest("content is empty".to_string()));
    }

    let budget = line_budget(&request.prefix, protocol_version);
    if budget == 0 {
        return Err(BridgeError::InvalidRequest(format!(
            "prefix '{}' leaves no room for content",
            request.prefix
        )));
    }

    let mut parts = split_message(content, budget);
    let dropped = parts.len().saturating_sub(request.max_parts);
    parts.truncate(request.max_parts);
    Ok((parts, dropped))
}

/// Characters left for content after the prefix.
pub fn line_budget(prefix: &str, protocol_version: i32) -> usize {
    max_line_length(protocol_version).saturating_sub(prefix.chars().count())
}

/// Sends chat lines through a session, one part at a time.
pub struct ChatSender {
    codec: InvisibleCharacterCodec,
    delays: SafetyDelays,
    recent: Mutex<RecentSends>,
}

impl ChatSender {
    pub fn new(delays: SafetyDelays) -> Self {
        Self {
            codec: InvisibleCharacterCodec::new(),
            delays,
            recent: Mutex::new(RecentSends::new()),
        }
    }

    /// Current safety delay for `class`.
    pub fn current_delay(&self, class: MessageClass) -> Duration {
        let base = self.delays.for_class(class);
        self.recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current_delay(base)
    }

    /// Send every part of `request`. The caller holds the Minecraft queue slot.
    pub async fn send(
        &self,
        handle: &SessionHandle,
        pending: &PendingResponse,
        request: &OutboundChatRequest,
    ) -> BridgeResult<SendOutcome> {
        let (parts, dropped) = prepare_parts(request, handle.protocol_version())?;
        if dropped > 0 {
            warn!(
                dropped,
                max_parts = request.max_parts,
                "Message too long; dropping excess parts"
            );
        }

        let budget = line_budget(&request.prefix, handle.protocol_version());
        let mut overall = SendOutcome::Delivered;
        for part in parts {
            let outcome = self
                .send_part(handle, pending, &request.prefix, &part, budget, request.class)
                .await;
            match outcome {
                SendOutcome::Delivered => {}
                SendOutcome::Unconfirmed => overall = SendOutcome::Unconfirmed,
                failure => return Ok(failure),
            }
        }
        Ok(overall)
    }

    async fn send_part(
        &self,
        handle: &SessionHandle,
        pending: &PendingResponse,
        prefix: &str,
        part: &str,
        budget: usize,
        class: MessageClass,
    ) -> SendOutcome {
        let mut mode = PaddingMode::Append;

        for attempt in 1..=MAX_SEND_ATTEMPTS {
            // Command arguments cannot carry padding.
            let body = if class == MessageClass::Command {
                part.to_string()
            } else {
                self.codec.pad(part, budget, mode)
            };

            match self.attempt(handle, pending, prefix, &body, class).await {
                AttemptOutcome::Echoed => return SendOutcome::Delivered,
                AttemptOutcome::Silent => return SendOutcome::Unconfirmed,
                AttemptOutcome::Blocked => return SendOutcome::Blocked,
                AttemptOutcome::Closed => return SendOutcome::NotConnected,
                AttemptOutcome::SpamRejected => {
                    warn!(attempt, "Send rejected as spam");
                    mode = PaddingMode::Interleave;
                    if attempt < MAX_SEND_ATTEMPTS {
                        tokio::time::sleep(self.delays.for_class(class) * attempt).await;
                    }
                }
            }
        }

        SendOutcome::Rejected
    }

    async fn attempt(
        &self,
        handle: &SessionHandle,
        pending: &PendingResponse,
        prefix: &str,
        body: &str,
        class: MessageClass,
    ) -> AttemptOutcome {
        let delay = self.current_delay(class);
        let signal = pending.arm(body);

        if handle.chat(format!("{}{}", prefix, body)).is_err() {
            pending.cancel();
            return AttemptOutcome::Closed;
        }

        let outcome = match tokio::time::timeout(delay, signal).await {
            Ok(Ok(ResponseSignal::Echo)) => AttemptOutcome::Echoed,
            Ok(Ok(ResponseSignal::Spam)) => AttemptOutcome::SpamRejected,
            Ok(Ok(ResponseSignal::Blocked)) => AttemptOutcome::Blocked,
            Ok(Err(_)) => AttemptOutcome::Closed,
            Err(_) => {
                debug!(?delay, "No response before safety delay");
                self.recent
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .record_send();
                AttemptOutcome::Silent
            }
        };
        pending.cancel();
        outcome
    }
}
