//! TCP game client.
//!
//! Logs in, then runs a play-state loop that answers keep-alives, confirms the
//! spawn position and forwards chat both ways.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::common::error::{ConnectionError, ProtocolError, ProtocolResult};
use crate::game::parser::strip_formatting;
use crate::game::session::{Session, SessionCommand, SessionConnector, SessionEvent, SessionHandle};
use crate::protocol::auth::{
    encrypt_with_public_key, generate_shared_secret, server_hash, SessionAuthenticator,
};
use crate::protocol::codec::{new_connection, FramedConnection, Packet, PacketDecode, PacketEncode};
use crate::protocol::packets::{
    ids, ChatPosition, ClientSettings, ClientboundChat, Disconnect, EncryptionRequest,
    EncryptionResponse, Handshake, JoinGame, KeepAlive, LoginStart, LoginSuccess,
    PositionAndLook, ServerboundChat, SetCompression, MAX_CHAT_LENGTH, PROTOCOL_VERSION,
};
use crate::protocol::text::component_to_legacy;

/// Connection settings for one account.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Present for online-mode servers.
    pub auth: Option<SessionAuthenticator>,
    pub connect_timeout: Duration,
}

/// Opens sessions over TCP.
#[derive(Debug, Clone)]
pub struct TcpSessionConnector {
    options: ClientOptions,
}

impl TcpSessionConnector {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }

    async fn login<S>(&self, connection: &mut FramedConnection<S>) -> ProtocolResult<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let handshake = Handshake {
            protocol_version: PROTOCOL_VERSION,
            server_address: self.options.host.clone(),
            server_port: self.options.port,
        };
        connection.send(handshake.to_packet()).await?;
        connection
            .send(
                LoginStart {
                    username: self.options.username.clone(),
                }
                .to_packet(),
            )
            .await?;

        loop {
            let Some(packet) = connection.next().await else {
                return Err(ProtocolError::LoginRejected {
                    reason: "connection closed during login".to_string(),
                });
            };
            let mut packet = packet?;

            match packet.id {
                ids::LOGIN_DISCONNECT => {
                    let disconnect = Disconnect::decode(&mut packet.payload)?;
                    return Err(ProtocolError::LoginRejected {
                        reason: strip_formatting(&component_to_legacy(&disconnect.reason_json)),
                    });
                }
                ids::ENCRYPTION_REQUEST => {
                    let request = EncryptionRequest::decode(&mut packet.payload)?;
                    self.on_encryption_request(connection, request).await?;
                }
                ids::LOGIN_SET_COMPRESSION => {
                    let compression = SetCompression::decode(&mut packet.payload)?;
                    debug!(threshold = compression.threshold, "Compression enabled");
                    connection.codec_mut().set_compression(compression.threshold);
                }
                ids::LOGIN_SUCCESS => {
                    let success = LoginSuccess::decode(&mut packet.payload)?;
                    info!(username = %success.username, uuid = %success.uuid, "Login successful");
                    return Ok(success.username);
                }
                other => {
                    debug!("Ignoring login packet 0x{:02X}", other);
                }
            }
        }
    }

    async fn on_encryption_request<S>(
        &self,
        connection: &mut FramedConnection<S>,
        request: EncryptionRequest,
    ) -> ProtocolResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some(auth) = &self.options.auth else {
            return Err(ProtocolError::AuthFailed {
                reason: "server requires online mode but no access token is configured"
                    .to_string(),
            });
        };

        let secret = generate_shared_secret();
        let hash = server_hash(&request.server_id, &secret, &request.public_key);
        auth.join(&hash).await?;

        let response = EncryptionResponse {
            shared_secret: encrypt_with_public_key(&request.public_key, &secret)?,
            verify_token: encrypt_with_public_key(&request.public_key, &request.verify_token)?,
        };
        connection.send(response.to_packet()).await?;

        // Everything after the response is encrypted.
        connection.codec_mut().enable_encryption(&secret)?;
        debug!("Encryption enabled");
        Ok(())
    }
}

#[async_trait]
impl SessionConnector for TcpSessionConnector {
    async fn open(&self) -> Result<Session, ConnectionError> {
        let ClientOptions {
            host,
            port,
            connect_timeout,
            ..
        } = &self.options;

        info!("Connecting to game server at {}:{}", host, port);
        let stream = tokio::time::timeout(*connect_timeout, TcpStream::connect((host.as_str(), *port)))
            .await
            .map_err(|_| ConnectionError::Timeout)?
            .map_err(|source| ConnectionError::ConnectFailed {
                host: host.clone(),
                port: *port,
                source,
            })?;
        stream.set_nodelay(true)?;

        let mut connection = new_connection(stream);
        let username = tokio::time::timeout(*connect_timeout, self.login(&mut connection))
            .await
            .map_err(|_| ConnectionError::Timeout)??;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_play(connection, event_tx, command_rx));

        Ok(Session {
            events: event_rx,
            handle: SessionHandle::new(command_tx, PROTOCOL_VERSION, username),
        })
    }
}

/// Actions the play loop takes after a packet.
enum PlayAction {
    Continue,
    Emit(SessionEvent),
    Close(SessionEvent),
}

/// Play-state loop. Ends when the server disconnects or the handle quits.
async fn run_play<S>(
    mut connection: FramedConnection<S>,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut spawned = false;

    let closing = loop {
        tokio::select! {
            packet = connection.next() => {
                let packet = match packet {
                    Some(Ok(packet)) => packet,
                    Some(Err(e)) => break SessionEvent::Error(e.to_string()),
                    None => break SessionEvent::End("connection closed".to_string()),
                };
                match handle_play_packet(&mut connection, packet, &mut spawned).await {
                    Ok(PlayAction::Continue) => {}
                    Ok(PlayAction::Emit(event)) => {
                        if events.send(event).is_err() {
                            debug!("Session events dropped; closing");
                            break SessionEvent::End("receiver dropped".to_string());
                        }
                    }
                    Ok(PlayAction::Close(event)) => break event,
                    Err(e) => break SessionEvent::Error(e.to_string()),
                }
            }

            command = commands.recv() => {
                match command {
                    Some(SessionCommand::Chat(text)) => {
                        let message: String = text.chars().take(MAX_CHAT_LENGTH).collect();
                        if let Err(e) = connection.send(ServerboundChat { message }.to_packet()).await {
                            break SessionEvent::Error(e.to_string());
                        }
                    }
                    Some(SessionCommand::Quit) | None => {
                        if let Err(e) = connection.close().await {
                            warn!("Error closing game connection: {}", e);
                        }
                        break SessionEvent::End("quit".to_string());
                    }
                }
            }
        }
    };

    debug!(event = ?closing, "Game session finished");
    let _ = events.send(closing);
}

async fn handle_play_packet<S>(
    connection: &mut FramedConnection<S>,
    packet: Packet,
    spawned: &mut bool,
) -> ProtocolResult<PlayAction>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut payload = packet.payload;

    match packet.id {
        ids::CLIENTBOUND_KEEP_ALIVE => {
            let keep_alive = KeepAlive::decode(&mut payload)?;
            connection.send(keep_alive.to_packet()).await?;
        }
        ids::JOIN_GAME => {
            let join = JoinGame::decode(&mut payload)?;
            debug!(entity_id = join.entity_id, gamemode = join.gamemode, "Joined game");
            connection.send(ClientSettings::default().to_packet()).await?;
        }
        ids::CLIENTBOUND_CHAT => {
            let chat = ClientboundChat::decode(&mut payload)?;
            if chat.position != ChatPosition::ActionBar {
                return Ok(PlayAction::Emit(SessionEvent::Chat(component_to_legacy(
                    &chat.json,
                ))));
            }
        }
        ids::CLIENTBOUND_POSITION_AND_LOOK => {
            let position = PositionAndLook::decode(&mut payload)?;
            connection.send(position.to_packet()).await?;
            if !*spawned {
                *spawned = true;
                info!("Spawned in world");
                return Ok(PlayAction::Emit(SessionEvent::Spawn));
            }
        }
        ids::PLAY_DISCONNECT => {
            let disconnect = Disconnect::decode(&mut payload)?;
            let reason = strip_formatting(&component_to_legacy(&disconnect.reason_json));
            return Ok(PlayAction::Close(SessionEvent::Kicked(reason)));
        }
        ids::PLAY_SET_COMPRESSION => {
            let compression = SetCompression::decode(&mut payload)?;
            connection.codec_mut().set_compression(compression.threshold);
        }
        _ => {
            // Ignore unknown packets
        }
    }

    Ok(PlayAction::Continue)
}
