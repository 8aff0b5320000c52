//! The chat bridge: one game account wired to its guild's Discord channels.
//!
//! A [`ChatBridge`] owns the connection lifecycle (connect, link, reconnect),
//! the two outbound queues and the event hub. Game lines are offered to the
//! pending send, raised as events, checked for commands and relayed to
//! Discord in arrival order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use backon::Retryable;
use fancy_regex::Regex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bridge::channels::LinkedChannels;
use crate::bridge::collector::{CollectorFilter, CollectorOptions, EndReason, MessageCollector};
use crate::bridge::events::{BridgeEvent, EventHub, Subscription};
use crate::bridge::filter::{FilterDirection, MessageFilter};
use crate::bridge::queue::SerialQueue;
use crate::bridge::relay::{report_outcome, RelayPolicy};
use crate::bridge::state::{BridgeState, ConnectionState};
use crate::common::command::{parse_command, CommandOrigin, ParsedCommand};
use crate::common::directory::{GuildConfigLookup, PlayerDirectory};
use crate::common::error::{BridgeError, BridgeResult, LinkError};
use crate::common::messages::{
    BroadcastRequest, ChatMessage, CommandRequest, DiscordMessage, DiscordOrigin, MessageType,
    OutboundChatRequest, WhisperDirection,
};
use crate::common::reconnect::{AttemptCounter, CONNECT_ABORT_BACKOFF, LINK_BACKOFF, RECONNECT_BACKOFF};
use crate::common::types::{
    ChannelKind, GuildLinkConfig, GUILD_CHAT_PREFIX, OFFICER_CHAT_PREFIX, PARTY_CHAT_PREFIX,
};
use crate::discord::channel::{DiscordChannel, DiscordChannelProvider};
use crate::discord::translator::ContentTranslator;
use crate::game::connection::{CloseReason, ConnectionEvent, ConnectionEvents, MinecraftConnection};
use crate::game::formatter::{FormatContext, MessageFormatter};
use crate::game::parser::ChatLineParser;
use crate::game::sender::{ChatSender, PendingResponse, SafetyDelays, SendOutcome};
use crate::game::session::{SessionConnector, SessionHandle};

/// How long a send waits for the bridge to become ready.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra command time granted per send queued ahead of it.
pub const COMMAND_QUEUE_ALLOWANCE: Duration = Duration::from_secs(2);

/// Lines a Discord message may be split into in game.
pub const DEFAULT_MAX_PARTS: usize = 2;

/// Per-bridge behaviour.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Name used in logs, usually the account name.
    pub name: String,
    /// Guild to link to. `None` links by the bot account's membership.
    pub guild_name: Option<String>,
    pub safety_delays: SafetyDelays,
    pub filter: MessageFilter,
    /// Format of Discord lines sent in game.
    pub discord_to_minecraft: MessageFormatter,
    /// Format of game lines the bot posts when the webhook fails.
    pub minecraft_to_discord: MessageFormatter,
    pub max_parts: usize,
    pub ready_timeout: Duration,
}

impl BridgeSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guild_name: None,
            safety_delays: SafetyDelays::default(),
            filter: MessageFilter::empty(),
            discord_to_minecraft: MessageFormatter::discord_to_minecraft_default(),
            minecraft_to_discord: MessageFormatter::minecraft_to_discord_default(),
            max_parts: DEFAULT_MAX_PARTS,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

/// Shared collaborators a bridge is built from.
#[derive(Clone)]
pub struct BridgeServices {
    pub connector: Arc<dyn SessionConnector>,
    pub players: Arc<dyn PlayerDirectory>,
    pub guilds: Arc<dyn GuildConfigLookup>,
    pub discord: Arc<dyn DiscordChannelProvider>,
    pub translator: Arc<ContentTranslator>,
}

/// Clears an in-flight flag when dropped.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Mutable connection state. Never held across an await.
struct Core {
    state: BridgeState,
    attempts: AttemptCounter,
    /// Bumped on every connect and teardown; stale tasks compare against it.
    generation: u64,
    connection: Option<MinecraftConnection>,
    parser: Option<Arc<ChatLineParser>>,
    linked: Option<LinkedChannels>,
    abort_timer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    link_task: Option<JoinHandle<()>>,
}

impl Core {
    fn new() -> Self {
        Self {
            state: BridgeState::new(),
            attempts: AttemptCounter::new(RECONNECT_BACKOFF),
            generation: 0,
            connection: None,
            parser: None,
            linked: None,
            abort_timer: None,
            reader: None,
            link_task: None,
        }
    }

    /// Drop per-session state. `reader` is taken without aborting when the
    /// caller is the reader itself.
    fn teardown(&mut self, abort_reader: bool) -> (ConnectionState, Option<MinecraftConnection>) {
        self.generation += 1;
        for task in [self.abort_timer.take(), self.link_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
        if let Some(reader) = self.reader.take() {
            if abort_reader {
                reader.abort();
            }
        }
        self.linked = None;
        self.parser = None;
        (self.state.mark_disconnected(), self.connection.take())
    }
}

struct Inner {
    name: String,
    guild_name: Option<String>,
    services: BridgeServices,
    relay: RelayPolicy,
    discord_format: MessageFormatter,
    max_parts: usize,
    ready_timeout: Duration,
    sender: ChatSender,
    pending: PendingResponse,
    minecraft_queue: SerialQueue,
    discord_queue: SerialQueue,
    events: EventHub,
    status: watch::Sender<ConnectionState>,
    core: Mutex<Core>,
    linking: AtomicBool,
    reconnecting: AtomicBool,
    relay_tx: mpsc::UnboundedSender<(Arc<ChatMessage>, ChannelKind)>,
}

/// A bridge between one game account and its guild's Discord channels.
#[derive(Clone)]
pub struct ChatBridge {
    inner: Arc<Inner>,
}

impl ChatBridge {
    /// Create a disconnected bridge. Must be called inside a tokio runtime.
    pub fn new(settings: BridgeSettings, services: BridgeServices) -> Self {
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(ConnectionState::Disconnected);

        let inner = Arc::new(Inner {
            name: settings.name,
            guild_name: settings.guild_name,
            services,
            relay: RelayPolicy::new(settings.filter, settings.minecraft_to_discord),
            discord_format: settings.discord_to_minecraft,
            max_parts: settings.max_parts,
            ready_timeout: settings.ready_timeout,
            sender: ChatSender::new(settings.safety_delays),
            pending: PendingResponse::new(),
            minecraft_queue: SerialQueue::new(),
            discord_queue: SerialQueue::new(),
            events: EventHub::new(),
            status,
            core: Mutex::new(Core::new()),
            linking: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            relay_tx,
        });
        tokio::spawn(relay_worker(Arc::downgrade(&inner), relay_rx));

        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state.connection()
    }

    pub fn is_ready(&self) -> bool {
        self.lock().state.is_ready()
    }

    pub fn is_linked(&self) -> bool {
        self.lock().state.is_linked()
    }

    pub fn should_reconnect(&self) -> bool {
        self.lock().state.should_reconnect()
    }

    /// Configuration of the guild this bridge is linked to.
    pub fn linked_config(&self) -> Option<GuildLinkConfig> {
        self.lock().linked.as_ref().map(|l| l.config().clone())
    }

    /// Whether a Discord channel is bound to this bridge.
    pub fn handles_channel(&self, channel_id: u64) -> bool {
        self.lock()
            .linked
            .as_ref()
            .is_some_and(|l| l.contains(channel_id))
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.inner.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open a session. No-op while connecting or ready.
    pub async fn connect(&self) {
        let (generation, attempt) = {
            let mut core = self.lock();
            if !core.state.begin_connect() {
                debug!(bridge = %self.inner.name, "Connect skipped; already {}", core.state.connection());
                return;
            }
            core.generation += 1;
            let generation = core.generation;
            let attempt = core.attempts.increment();

            let abort_after = CONNECT_ABORT_BACKOFF.delay_for(attempt);
            let bridge = self.clone();
            core.abort_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(abort_after).await;
                bridge.on_connect_timeout(generation, abort_after);
            }));
            (generation, attempt)
        };

        self.inner.status.send_replace(ConnectionState::Connecting);
        self.inner.events.emit(BridgeEvent::Connect);
        info!(bridge = %self.inner.name, attempt, "Connecting to Minecraft");

        let session = match self.inner.services.connector.open().await {
            Ok(session) => session,
            Err(e) => {
                error!(bridge = %self.inner.name, "Failed to open session: {}", e);
                self.on_closed(generation, CloseReason::Error(e.to_string()));
                return;
            }
        };

        let parser = Arc::new(ChatLineParser::new(
            session.handle.username(),
            self.inner.services.players.clone(),
        ));
        let (connection, events) = MinecraftConnection::start(session, parser.clone());

        let mut core = self.lock();
        if core.generation != generation {
            drop(core);
            debug!(bridge = %self.inner.name, "Connection attempt superseded");
            connection.close();
            return;
        }
        core.connection = Some(connection);
        core.parser = Some(parser);
        core.reader = Some(tokio::spawn(self.clone().read_events(events, generation)));
    }

    /// Close the session and unlink. Close errors are logged, never returned.
    pub fn disconnect(&self) {
        let (previous, connection) = self.lock().teardown(true);

        self.inner.pending.cancel();
        if let Some(connection) = connection {
            connection.close();
        }
        self.inner.status.send_replace(ConnectionState::Disconnected);

        if previous != ConnectionState::Disconnected {
            info!(bridge = %self.inner.name, "Disconnected");
            self.inner
                .events
                .emit(BridgeEvent::Disconnect("manual".to_string()));
        }
    }

    /// Disconnect, wait, connect again. Concurrent calls collapse into one.
    pub async fn reconnect(&self, delay: Option<Duration>) {
        let Some(guard) = FlagGuard::acquire(&self.inner.reconnecting) else {
            debug!(bridge = %self.inner.name, "Reconnect already in progress");
            return;
        };

        self.disconnect();
        let (delay, generation) = {
            let core = self.lock();
            (delay.unwrap_or_else(|| core.attempts.current_delay()), core.generation)
        };
        info!(bridge = %self.inner.name, ?delay, "Reconnecting");
        tokio::time::sleep(delay).await;
        drop(guard);

        if !self.should_reconnect() {
            warn!(bridge = %self.inner.name, "Reconnect cancelled; reconnecting is disabled");
            return;
        }
        if self.lock().generation != generation {
            debug!(bridge = %self.inner.name, "Reconnect superseded");
            return;
        }
        self.connect().await;
    }

    fn spawn_reconnect(&self) {
        let bridge = self.clone();
        tokio::spawn(async move { bridge.reconnect(None).await });
    }

    fn on_connect_timeout(&self, generation: u64, waited: Duration) {
        let stalled = {
            let core = self.lock();
            core.generation == generation && core.state.connection() == ConnectionState::Connecting
        };
        if stalled {
            warn!(bridge = %self.inner.name, ?waited, "No spawn; restarting the connection");
            self.spawn_reconnect();
        }
    }

    fn on_spawn(&self, generation: u64) {
        let needs_link = {
            let mut core = self.lock();
            if core.generation != generation || !core.state.mark_ready() {
                return;
            }
            core.attempts.reset();
            if let Some(timer) = core.abort_timer.take() {
                timer.abort();
            }
            !core.state.is_linked()
        };

        self.inner.status.send_replace(ConnectionState::Ready);
        info!(bridge = %self.inner.name, "Spawned in game");
        self.inner.events.emit(BridgeEvent::Ready);

        if needs_link {
            let bridge = self.clone();
            let task = tokio::spawn(async move {
                let _ = bridge.link(None).await;
            });
            self.lock().link_task = Some(task);
        }
    }

    /// Unexpected end of the session for `generation`.
    fn on_closed(&self, generation: u64, reason: CloseReason) {
        let should_reconnect = {
            let mut core = self.lock();
            if core.generation != generation {
                return;
            }
            core.teardown(false);
            core.state.should_reconnect()
        };

        self.inner.pending.cancel();
        self.inner.status.send_replace(ConnectionState::Disconnected);
        warn!(bridge = %self.inner.name, "Session closed ({})", reason);
        self.inner
            .events
            .emit(BridgeEvent::Disconnect(reason.to_string()));

        if should_reconnect {
            self.spawn_reconnect();
        } else {
            error!(
                bridge = %self.inner.name,
                "Session closed and reconnecting is disabled; operator action required"
            );
        }
    }

    // ========================================================================
    // Linking
    // ========================================================================

    /// Bind the guild's Discord channels.
    ///
    /// Retries lookup and channel failures with a linear backoff. A permission
    /// denial is fatal: reconnecting is disabled and the bridge disconnects.
    pub async fn link(&self, guild_name: Option<String>) -> Result<(), LinkError> {
        let Some(_guard) = FlagGuard::acquire(&self.inner.linking) else {
            debug!(bridge = %self.inner.name, "Link already in progress");
            return Ok(());
        };

        let guild_name = guild_name.or_else(|| self.inner.guild_name.clone());
        let generation = self.lock().generation;

        let result = (|| self.bind_channels(guild_name.as_deref()))
            .retry(LINK_BACKOFF)
            .when(LinkError::is_retryable)
            .notify(|e: &LinkError, delay: Duration| {
                warn!(bridge = %self.inner.name, ?delay, "Linking failed: {}", e);
            })
            .await;

        match result {
            Ok(linked) => {
                let mut core = self.lock();
                if core.generation != generation {
                    debug!(bridge = %self.inner.name, "Link result discarded; session changed");
                    return Ok(());
                }
                info!(
                    bridge = %self.inner.name,
                    guild = %linked.config().name,
                    "Linked {} Discord channels",
                    linked.all().len()
                );
                core.linked = Some(linked);
                core.state.set_linked(true);
                Ok(())
            }
            Err(e) => {
                error!(bridge = %self.inner.name, "Linking failed permanently: {}", e);
                self.lock().state.disable_reconnect();
                // Wake senders waiting for readiness.
                self.inner.status.send_modify(|_| {});
                self.inner.events.emit(BridgeEvent::Error(e.to_string()));

                let bridge = self.clone();
                tokio::spawn(async move { bridge.disconnect() });
                Err(e)
            }
        }
    }

    async fn bind_channels(&self, guild_name: Option<&str>) -> Result<LinkedChannels, LinkError> {
        let guilds = &self.inner.services.guilds;
        let config = match guild_name {
            Some(name) => guilds
                .resolve_guild_config(name)
                .ok_or_else(|| LinkError::GuildNotFound(name.to_string()))?,
            None => {
                let ign = self.own_ign();
                guilds
                    .resolve_guild_for_member(&ign)
                    .ok_or(LinkError::GuildNotFound(ign))?
            }
        };
        LinkedChannels::bind(config, self.inner.services.discord.as_ref()).await
    }

    fn own_ign(&self) -> String {
        self.lock()
            .connection
            .as_ref()
            .map(|c| c.username().to_string())
            .unwrap_or_default()
    }

    fn linked_channel(&self, kind: ChannelKind) -> Option<Arc<dyn DiscordChannel>> {
        self.lock()
            .linked
            .as_ref()
            .and_then(|l| l.channel(kind).cloned())
    }

    fn linked_channel_by_id(&self, channel_id: u64) -> Option<Arc<dyn DiscordChannel>> {
        self.lock()
            .linked
            .as_ref()
            .and_then(|l| l.by_id(channel_id).map(|(_, c)| c.clone()))
    }

    // ========================================================================
    // Incoming
    // ========================================================================

    async fn read_events(self, mut events: ConnectionEvents, generation: u64) {
        while let Some(event) = events.next().await {
            match event {
                ConnectionEvent::Spawn => self.on_spawn(generation),
                ConnectionEvent::Message(message) => self.on_message(message),
                ConnectionEvent::Closed(reason) => {
                    self.on_closed(generation, reason);
                    break;
                }
            }
        }
    }

    fn on_message(&self, message: Arc<ChatMessage>) {
        debug!(bridge = %self.inner.name, "Game: {}", message.cleaned_text);
        self.inner.pending.offer(&message);
        self.inner.events.emit(BridgeEvent::Message(message.clone()));

        if let Some(command) = self.detect_command(&message) {
            debug!(bridge = %self.inner.name, command = %command.name, "In-game command");
            self.inner.events.emit(BridgeEvent::Command {
                message: message.clone(),
                command,
            });
        }

        if let Some(kind) = self.inner.relay.target(&message) {
            if self.inner.relay_tx.send((message, kind)).is_err() {
                warn!(bridge = %self.inner.name, "Relay worker is gone");
            }
        }
    }

    fn detect_command(&self, message: &ChatMessage) -> Option<ParsedCommand> {
        if message.is_from_self {
            return None;
        }
        let origin = match (message.message_type?, message.whisper_direction) {
            (MessageType::Whisper, Some(WhisperDirection::Incoming)) => CommandOrigin::Whisper,
            (MessageType::Whisper, _) => return None,
            _ => CommandOrigin::GuildChat,
        };

        let (prefixes, bot_ign) = {
            let core = self.lock();
            let prefixes = core
                .linked
                .as_ref()
                .map(|l| l.config().prefixes.clone())
                .unwrap_or_default();
            let bot_ign = core
                .parser
                .as_ref()
                .map(|p| p.bot_ign().to_string())
                .unwrap_or_default();
            (prefixes, bot_ign)
        };
        parse_command(&message.content, &prefixes, &bot_ign, origin)
    }

    async fn relay(&self, message: Arc<ChatMessage>, kind: ChannelKind) {
        let Some(channel) = self.linked_channel(kind) else {
            debug!(bridge = %self.inner.name, "Not linked; dropping relay of {:?} line", kind);
            return;
        };

        let _slot = self.inner.discord_queue.enqueue().await;
        if let Err(e) = self
            .inner
            .relay
            .deliver(channel.as_ref(), &self.inner.services.translator, &message)
            .await
        {
            warn!(bridge = %self.inner.name, "Failed to relay to Discord: {}", e);
            self.inner.events.emit(BridgeEvent::Error(e.to_string()));
        }
    }

    /// Relay a Discord message into the game chat its channel is mapped to.
    ///
    /// `content` must already be translated. Returns `None` when a filter
    /// dropped the message.
    pub async fn handle_discord_message(
        &self,
        message: DiscordMessage,
    ) -> BridgeResult<Option<SendOutcome>> {
        let kind = {
            let core = self.lock();
            let linked = core.linked.as_ref().ok_or(BridgeError::NotLinked)?;
            linked.config().kind_for(message.channel_id).ok_or_else(|| {
                BridgeError::InvalidRequest(format!(
                    "channel {} is not bridged",
                    message.channel_id
                ))
            })?
        };

        if let Some(pattern) = self
            .inner
            .relay
            .filter()
            .blocking_pattern(FilterDirection::DiscordToMinecraft, &message.content)
        {
            info!(bridge = %self.inner.name, pattern, "Filtered Discord message: {}", message.content);
            return Ok(None);
        }

        let context =
            FormatContext::new(&message.author_name, &message.content).with_channel(kind.name());
        let content = self.inner.discord_format.format(&context);
        let request = OutboundChatRequest::new(kind.chat_prefix(), content)
            .with_max_parts(self.inner.max_parts)
            .with_origin(message.origin());

        self.chat(request).await.map(Some)
    }

    // ========================================================================
    // Outgoing
    // ========================================================================

    /// Send a chat request through the Minecraft queue.
    ///
    /// Waits for readiness up to the ready timeout, and fails fast once
    /// reconnecting is disabled.
    pub async fn chat(&self, request: OutboundChatRequest) -> BridgeResult<SendOutcome> {
        if request.max_parts == 0 {
            return Err(BridgeError::InvalidRequest(
                "max_parts must be at least 1".to_string(),
            ));
        }
        if request.content.trim().is_empty() {
            return Err(BridgeError::InvalidRequest("content is empty".to_string()));
        }

        let slot = self.inner.minecraft_queue.enqueue().await;
        let outcome = match self.wait_ready().await {
            Some(handle) => {
                self.inner
                    .sender
                    .send(&handle, &self.inner.pending, &request)
                    .await?
            }
            None => {
                warn!(bridge = %self.inner.name, "Not connected; dropping send");
                SendOutcome::NotConnected
            }
        };
        slot.release();
        debug!(bridge = %self.inner.name, ?outcome, "Send finished");

        if let Some(origin) = request.origin {
            self.report(origin, outcome).await;
        }
        Ok(outcome)
    }

    pub async fn gchat(&self, content: impl Into<String>) -> BridgeResult<SendOutcome> {
        self.chat(OutboundChatRequest::new(GUILD_CHAT_PREFIX, content))
            .await
    }

    pub async fn ochat(&self, content: impl Into<String>) -> BridgeResult<SendOutcome> {
        self.chat(OutboundChatRequest::new(OFFICER_CHAT_PREFIX, content))
            .await
    }

    pub async fn pchat(&self, content: impl Into<String>) -> BridgeResult<SendOutcome> {
        self.chat(OutboundChatRequest::new(PARTY_CHAT_PREFIX, content))
            .await
    }

    pub async fn whisper(&self, ign: &str, content: impl Into<String>) -> BridgeResult<SendOutcome> {
        if ign.trim().is_empty() || ign.contains(char::is_whitespace) {
            return Err(BridgeError::InvalidRequest(format!("invalid ign '{}'", ign)));
        }
        self.chat(OutboundChatRequest::new(format!("/w {} ", ign), content))
            .await
    }

    /// Run an in-game command and return its reply lines joined by newlines.
    pub async fn command(&self, request: CommandRequest) -> BridgeResult<String> {
        let replies = self.command_messages(request).await?;
        Ok(replies
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Run an in-game command and collect its reply lines.
    pub async fn command_messages(
        &self,
        request: CommandRequest,
    ) -> BridgeResult<Vec<Arc<ChatMessage>>> {
        let command = request.command.trim().trim_start_matches('/').to_string();
        if command.is_empty() {
            return Err(BridgeError::InvalidRequest("command is empty".to_string()));
        }
        if request.max == Some(0) {
            return Err(BridgeError::InvalidRequest("max must be at least 1".to_string()));
        }
        let pattern = request
            .response_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| BridgeError::InvalidRequest(format!("invalid response pattern: {}", e)))?;

        if !self.is_ready() && !self.should_reconnect() {
            return Err(BridgeError::NotConnected);
        }

        // Time spent queued behind other sends does not count against the reply.
        let queued = self.inner.minecraft_queue.size()
            + usize::from(self.inner.minecraft_queue.is_running());
        let budget = request.timeout + COMMAND_QUEUE_ALLOWANCE * queued as u32;

        let filter = move |message: &ChatMessage, _collected: &[Arc<ChatMessage>]| {
            message.is_system()
                && !message.is_spam
                && !message.is_blocked
                && pattern
                    .as_ref()
                    .map_or(true, |p| p.is_match(&message.cleaned_text).unwrap_or(false))
        };
        let mut options = CollectorOptions::default().with_time(budget);
        if let Some(max) = request.max {
            options = options.with_max(max);
        }
        let mut collector = self.collector(filter, options);

        let outcome = self.chat(OutboundChatRequest::command(command)).await?;
        match outcome {
            SendOutcome::Delivered | SendOutcome::Unconfirmed => {}
            SendOutcome::NotConnected => {
                collector.stop();
                return Err(BridgeError::NotConnected);
            }
            failure => {
                collector.stop();
                return Err(BridgeError::SendFailed(format!("{:?}", failure)));
            }
        }

        let (collected, reason) = collector.finished().await;
        debug!(bridge = %self.inner.name, %reason, replies = collected.len(), "Command finished");
        match reason {
            EndReason::Time if request.reject_on_timeout => Err(BridgeError::Timeout),
            EndReason::Disconnect if collected.is_empty() => Err(BridgeError::NotConnected),
            _ => Ok(collected),
        }
    }

    /// Post content to the guild's Discord channel and/or guild chat.
    pub async fn broadcast(&self, request: BroadcastRequest) -> BridgeResult<()> {
        if request.content.trim().is_empty() {
            return Err(BridgeError::InvalidRequest("content is empty".to_string()));
        }

        let channel = if request.discord {
            Some(
                self.linked_channel(ChannelKind::Guild)
                    .ok_or(BridgeError::NotLinked)?,
            )
        } else {
            None
        };

        if let Some(channel) = channel {
            let _slot = self.inner.discord_queue.enqueue().await;
            channel.send_via_bot(&request.content).await?;
        }

        if request.minecraft {
            let outcome = self.gchat(request.content).await?;
            if !outcome.is_success() {
                return Err(BridgeError::SendFailed(format!("{:?}", outcome)));
            }
        }
        Ok(())
    }

    /// Collect messages until the collector ends.
    pub async fn await_messages(
        &self,
        filter: impl CollectorFilter,
        options: CollectorOptions,
    ) -> (Vec<Arc<ChatMessage>>, EndReason) {
        self.collector(filter, options).finished().await
    }

    pub fn collector(&self, filter: impl CollectorFilter, options: CollectorOptions) -> MessageCollector {
        MessageCollector::spawn(self.inner.events.subscribe(), filter, options)
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.events.subscribe()
    }

    async fn wait_ready(&self) -> Option<SessionHandle> {
        let mut status = self.inner.status.subscribe();
        let wait = async {
            loop {
                if let Some(handle) = self.live_handle() {
                    return Some(handle);
                }
                if !self.should_reconnect() {
                    return None;
                }
                if status.changed().await.is_err() {
                    return None;
                }
            }
        };
        tokio::time::timeout(self.inner.ready_timeout, wait)
            .await
            .ok()
            .flatten()
    }

    fn live_handle(&self) -> Option<SessionHandle> {
        let core = self.lock();
        if !core.state.is_ready() {
            return None;
        }
        core.connection.as_ref().map(|c| c.handle().clone())
    }

    async fn report(&self, origin: DiscordOrigin, outcome: SendOutcome) {
        let Some(channel) = self.linked_channel_by_id(origin.channel_id) else {
            return;
        };
        let _slot = self.inner.discord_queue.enqueue().await;
        if let Err(e) = report_outcome(channel.as_ref(), origin, outcome).await {
            warn!(bridge = %self.inner.name, "Failed to report send outcome: {}", e);
        }
    }
}

/// Delivers relayed lines in arrival order.
async fn relay_worker(
    inner: Weak<Inner>,
    mut rx: mpsc::UnboundedReceiver<(Arc<ChatMessage>, ChannelKind)>,
) {
    while let Some((message, kind)) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        ChatBridge { inner }.relay(message, kind).await;
    }
    debug!("Relay worker stopped");
}
