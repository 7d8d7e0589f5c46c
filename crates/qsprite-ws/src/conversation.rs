//! The conversation lifecycle.
//!
//! ```text
//! CREATED ──► BINDING ──┬──► FAILED   (socket dropped, no events)
//!                       └──► OPEN ──► CLOSED
//! ```
//!
//! A [`Conversation`] owns the socket and runs as one task: it binds and
//! authenticates the requested services, performs the dialect handshake,
//! then decodes inbound chunks and routes envelopes until either side
//! closes. Everything else talks to it through a cloneable
//! [`ConversationHandle`].

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use indexmap::IndexMap;
use qsprite_telemetry::metrics::{
    record_conversation_closed, record_conversation_failed, record_conversation_opened,
    record_message_received, record_protocol_error, FailureStage,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::codec::{Dialect, Packet};
use crate::config::ConversationConfig;
use crate::envelope::Envelope;
use crate::error::{WsError, WsResult};
use crate::hub::Hub;
use crate::hybi;
use crate::legacy::{self, NONCE_LEN};
use crate::message::Message;
use crate::origin::OriginPolicy;
use crate::request::UpgradeRequest;
use crate::service::{ServiceContext, ServiceInstance};

/// A unique identifier for a conversation.
///
/// Sent to the client as the `Session-Token` handshake header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationToken(Uuid);

impl ConversationToken {
    /// Create a new time-ordered token.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a token from a UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConversationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConversationToken {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<ConversationToken> for Uuid {
    fn from(token: ConversationToken) -> Self {
        token.0
    }
}

/// Lifecycle state of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConversationState {
    /// Constructed; binding not started.
    Created = 0,
    /// Binding and authenticating services.
    Binding = 1,
    /// Binding or handshake failed; the socket was dropped.
    Failed = 2,
    /// Handshake done; messages flow.
    Open = 3,
    /// Closed after having been open.
    Closed = 4,
}

impl ConversationState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Binding,
            2 => Self::Failed,
            3 => Self::Open,
            _ => Self::Closed,
        }
    }

    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Binding => "binding",
            Self::Failed => "failed",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Events published to conversation subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// The handshake completed.
    Open,
    /// A complete data message arrived.
    Message(Message),
    /// A protocol or socket error; the conversation is closing.
    Error(String),
    /// The conversation closed.
    Close,
}

/// What the caller of [`Conversation::handle_packet`] should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    /// Keep reading.
    Continue,
    /// Tear the conversation down.
    Close,
}

#[derive(Debug)]
enum Command {
    Write(Bytes),
    Close(Option<u16>),
}

struct Shared {
    token: ConversationToken,
    dialect: Dialect,
    state: AtomicU8,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ConversationEvent>,
}

/// A cloneable handle to a running conversation.
#[derive(Clone)]
pub struct ConversationHandle {
    shared: Arc<Shared>,
}

impl ConversationHandle {
    fn new(dialect: Dialect, event_capacity: usize) -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let handle = Self {
            shared: Arc::new(Shared {
                token: ConversationToken::new(),
                dialect,
                state: AtomicU8::new(ConversationState::Created as u8),
                commands,
                events,
            }),
        };
        (handle, rx)
    }

    /// A handle with no conversation task behind it.
    #[cfg(test)]
    pub(crate) fn detached(dialect: Dialect) -> Self {
        Self::new(dialect, 1).0
    }

    /// Get the conversation token.
    pub fn token(&self) -> ConversationToken {
        self.shared.token
    }

    /// Get the wire dialect.
    pub fn dialect(&self) -> Dialect {
        self.shared.dialect
    }

    /// Get the lifecycle state.
    pub fn state(&self) -> ConversationState {
        ConversationState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Check if the conversation is open.
    pub fn is_open(&self) -> bool {
        self.state() == ConversationState::Open
    }

    /// Subscribe to lifecycle and message events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.shared.events.subscribe()
    }

    /// Send an envelope as a sentinel-prefixed text message.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` if the conversation is not open.
    pub fn send(&self, envelope: &Envelope) -> WsResult<()> {
        self.ensure_open()?;
        let text = envelope.encode()?;
        self.push(Command::Write(self.dialect().encode_text(&text)))
    }

    /// Send a raw text message.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` if the conversation is not open.
    pub fn send_text(&self, text: &str) -> WsResult<()> {
        self.ensure_open()?;
        self.push(Command::Write(self.dialect().encode_text(text)))
    }

    /// Send a binary message.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` if the conversation is not open; `Unsupported` on
    /// the legacy dialect.
    pub fn send_binary(&self, data: impl Into<Bytes>) -> WsResult<()> {
        self.ensure_open()?;
        let frame = self.dialect().encode_binary(data.into())?;
        self.push(Command::Write(frame))
    }

    /// Send a ping. A no-op on the legacy dialect.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` if the conversation is not open.
    pub fn ping(&self) -> WsResult<()> {
        self.ensure_open()?;
        match self.dialect().encode_ping() {
            Some(frame) => self.push(Command::Write(frame)),
            None => Ok(()),
        }
    }

    /// Ask the conversation to close. Repeated calls are no-ops.
    pub fn close(&self) {
        if self.is_open() {
            let _ = self.shared.commands.send(Command::Close(None));
        }
    }

    fn ensure_open(&self) -> WsResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(WsError::connection_closed(format!(
                "conversation is {}",
                self.state()
            )))
        }
    }

    fn push(&self, command: Command) -> WsResult<()> {
        self.shared
            .commands
            .send(command)
            .map_err(|_| WsError::connection_closed("conversation task has exited"))
    }

    fn set_state(&self, state: ConversationState) -> ConversationState {
        ConversationState::from_u8(self.shared.state.swap(state as u8, Ordering::AcqRel))
    }

    fn publish(&self, event: ConversationEvent) {
        // No subscribers is fine.
        let _ = self.shared.events.send(event);
    }
}

impl fmt::Debug for ConversationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationHandle")
            .field("token", &self.token())
            .field("dialect", &self.dialect())
            .field("state", &self.state())
            .finish()
    }
}

/// A conversation over one upgraded socket.
pub struct Conversation<S> {
    handle: ConversationHandle,
    commands: mpsc::UnboundedReceiver<Command>,
    hub: Weak<Hub>,
    socket: S,
    request: UpgradeRequest,
    head: BytesMut,
    services: IndexMap<String, ServiceInstance>,
    config: ConversationConfig,
    origins: OriginPolicy,
    opened_at: Option<Instant>,
    close_sent: bool,
}

impl<S> Conversation<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(
        hub: &Arc<Hub>,
        socket: S,
        request: UpgradeRequest,
        head: Bytes,
        dialect: Dialect,
    ) -> Self {
        let config = hub.config().clone();
        let (handle, commands) = ConversationHandle::new(dialect, config.event_capacity);
        Self {
            handle,
            commands,
            hub: Arc::downgrade(hub),
            socket,
            request,
            head: BytesMut::from(&head[..]),
            services: IndexMap::new(),
            origins: hub.origins().clone(),
            config,
            opened_at: None,
            close_sent: false,
        }
    }

    /// Get a handle to this conversation.
    pub fn handle(&self) -> ConversationHandle {
        self.handle.clone()
    }

    /// Get the conversation token.
    pub fn token(&self) -> ConversationToken {
        self.handle.token()
    }

    /// Get the wire dialect.
    pub fn dialect(&self) -> Dialect {
        self.handle.dialect()
    }

    /// Get the upgrade request.
    pub fn request(&self) -> &UpgradeRequest {
        &self.request
    }

    /// Names of the bound services, in binding order.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Get a bound service.
    pub fn service(&self, name: &str) -> Option<&ServiceInstance> {
        self.services.get(name)
    }

    /// Check `origin` against the hub's allow-list.
    pub fn verify_origin(&self, origin: Option<&str>) -> bool {
        self.origins.verify(origin)
    }

    /// Drive the conversation to completion.
    ///
    /// Binds the services named in the request query, performs the
    /// handshake, then serves until either side closes. A binding or
    /// handshake failure drops the socket without publishing any event.
    #[instrument(name = "conversation", skip_all, fields(token = %self.handle.token(), dialect = %self.handle.dialect()))]
    pub async fn run(mut self) -> WsResult<()> {
        self.handle.set_state(ConversationState::Binding);

        let names = self.request.requested_services();
        if let Err(e) = self.bind_services(&names).await {
            return Err(self.fail(FailureStage::Binding, e));
        }
        if let Err(e) = self.initialize().await {
            return Err(self.fail(FailureStage::Handshake, e));
        }

        let result = self.serve().await;
        if let Err(e) = &result {
            self.handle.publish(ConversationEvent::Error(e.to_string()));
        }
        self.finish().await;
        result
    }

    /// Bind and authenticate `names` in order.
    ///
    /// Each service is authenticated only after the previous one accepted;
    /// the first failure aborts the chain.
    ///
    /// # Errors
    ///
    /// `NoServices` for an empty list, otherwise the first binding error.
    pub async fn bind_services(&mut self, names: &[String]) -> WsResult<()> {
        if names.is_empty() {
            warn!("connection requested no services");
            return Err(WsError::NoServices);
        }
        for name in names {
            self.bind_service(name).await?;
        }
        Ok(())
    }

    /// Bind and authenticate one service.
    ///
    /// # Errors
    ///
    /// `ServiceAlreadyBound`, `UnknownService`, `NotConversational`,
    /// `AuthRejected`, or `HubGone`.
    #[instrument(skip(self))]
    pub async fn bind_service(&mut self, name: &str) -> WsResult<()> {
        if self.services.contains_key(name) {
            return Err(WsError::already_bound(name));
        }

        let factory = self.hub()?.catalog().resolve(name)?;
        let service = factory.create(ServiceContext::new(name, self.handle.clone()));

        if !service.request_auth(&self.request).await {
            warn!("service rejected authentication");
            return Err(WsError::auth_rejected(name));
        }

        self.services
            .insert(name.to_string(), ServiceInstance::new(name, service, true));
        debug!("service bound");
        Ok(())
    }

    /// Perform the dialect handshake and open the conversation.
    ///
    /// # Errors
    ///
    /// Handshake errors leave the socket without a single byte written.
    pub async fn initialize(&mut self) -> WsResult<()> {
        let token = self.handle.token();
        let response = match self.handle.dialect() {
            Dialect::Hybi(version) => hybi::handshake(&self.request, version, &self.origins, &token)?,
            Dialect::Legacy => {
                let nonce = if legacy::has_challenge(&self.request) {
                    Some(self.read_nonce().await?)
                } else {
                    None
                };
                legacy::handshake(&self.request, &self.origins, &token, nonce.as_ref())?
            }
        };

        let hub = self.hub()?;
        if !hub.registry().insert(self.handle.clone()) {
            return Err(WsError::handshake_failed(format!("token {token} is already registered")));
        }
        // Open before the shutdown check: a shutdown that misses the flag
        // here still finds this handle open and asks it to close.
        self.handle.set_state(ConversationState::Open);
        if hub.is_shutdown() {
            hub.registry().remove(&token);
            return Err(WsError::connection_closed("hub is shutting down"));
        }

        let written = match self.socket.write_all(&response).await {
            Ok(()) => self.socket.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            hub.registry().remove(&token);
            return Err(e.into());
        }
        self.opened_at = Some(Instant::now());

        for instance in self.services.values() {
            instance.service().on_open();
        }
        self.handle.publish(ConversationEvent::Open);
        record_conversation_opened(self.dialect().name());
        info!(
            services = ?self.services.keys().collect::<Vec<_>>(),
            "conversation opened"
        );
        Ok(())
    }

    /// Act on one decoded packet.
    ///
    /// Envelopes go to their bound service; `bind_client_service` binds one
    /// more service. Unroutable envelopes are logged and dropped.
    ///
    /// # Errors
    ///
    /// Only socket write failures.
    pub async fn handle_packet(&mut self, packet: Packet) -> WsResult<PacketOutcome> {
        let dialect = self.dialect();
        match packet {
            Packet::Text(text) => {
                let envelope = Envelope::parse(&text);
                let kind = if matches!(envelope, Ok(Some(_))) { "envelope" } else { "text" };
                record_message_received(dialect.name(), kind);
                self.handle.publish(ConversationEvent::Message(Message::Text(text)));

                match envelope {
                    Ok(Some(envelope)) => self.route(envelope).await,
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "discarding malformed envelope"),
                }
            }
            Packet::Binary(data) => {
                record_message_received(dialect.name(), "binary");
                self.handle.publish(ConversationEvent::Message(Message::Binary(data)));
            }
            Packet::Ping(payload) => {
                if let Some(pong) = dialect.encode_pong(payload) {
                    self.socket.write_all(&pong).await?;
                }
            }
            Packet::Pong(_) => trace!("pong received"),
            Packet::Close(code) => {
                debug!(code = ?code, "peer sent close");
                self.write_close(code).await;
                return Ok(PacketOutcome::Close);
            }
            Packet::Error(reason) => {
                error!(reason = %reason, "web socket parser error");
                record_protocol_error(dialect.name());
                self.handle.publish(ConversationEvent::Error(reason));
                return Ok(PacketOutcome::Close);
            }
        }
        Ok(PacketOutcome::Continue)
    }

    async fn route(&mut self, envelope: Envelope) {
        if envelope.is_bind_client_service() {
            let Some(name) = envelope.bind_target().map(str::to_string) else {
                warn!("bind_client_service without a service name");
                return;
            };
            match self.bind_service(&name).await {
                Ok(()) => {
                    if let Some(instance) = self.services.get(&name) {
                        instance.service().on_open();
                    }
                    info!(service = %name, "service bound to open conversation");
                }
                Err(e) => warn!(service = %name, error = %e, "late service binding failed"),
            }
            return;
        }

        let target = envelope
            .service
            .as_deref()
            .and_then(|name| self.services.get(name))
            .map(|instance| Arc::clone(instance.service()));

        match target {
            Some(service) => {
                if let Err(e) = service.receive_message(envelope).await {
                    warn!(error = %e, "service failed to handle message");
                }
            }
            None => warn!(
                service = ?envelope.service,
                "Could not find the message handler, discarding the message"
            ),
        }
    }

    async fn serve(&mut self) -> WsResult<()> {
        let mut decoder = self.dialect().decoder(self.config.max_message_size);

        if !self.head.is_empty() {
            let head = self.head.split();
            for packet in decoder.feed(&head) {
                if self.handle_packet(packet).await? == PacketOutcome::Close {
                    return Ok(());
                }
            }
        }

        let mut buf = BytesMut::with_capacity(self.config.read_buffer_size);
        loop {
            tokio::select! {
                read = self.socket.read_buf(&mut buf) => {
                    if read? == 0 {
                        debug!("peer ended the connection");
                        return Ok(());
                    }
                    let chunk = buf.split();
                    for packet in decoder.feed(&chunk) {
                        if self.handle_packet(packet).await? == PacketOutcome::Close {
                            return Ok(());
                        }
                    }
                    buf.reserve(self.config.read_buffer_size);
                }
                command = self.commands.recv() => match command {
                    Some(Command::Write(bytes)) => self.socket.write_all(&bytes).await?,
                    Some(Command::Close(code)) => {
                        self.write_close(code).await;
                        return Ok(());
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    async fn write_close(&mut self, code: Option<u16>) {
        if self.close_sent {
            return;
        }
        self.close_sent = true;
        let frame = self.dialect().encode_close(code);
        if let Err(e) = self.socket.write_all(&frame).await {
            debug!(error = %e, "failed to write close frame");
        }
    }

    async fn finish(&mut self) {
        let previous = self.handle.set_state(ConversationState::Closed);
        if previous == ConversationState::Open {
            if let Some(hub) = self.hub.upgrade() {
                hub.registry().remove(&self.handle.token());
            }
            for instance in self.services.values() {
                instance.service().on_close();
            }
            self.handle.publish(ConversationEvent::Close);
            let lifetime = self.opened_at.map(|t| t.elapsed()).unwrap_or_default();
            record_conversation_closed(self.dialect().name(), lifetime);
            info!(lifetime_ms = lifetime.as_millis() as u64, "conversation closed");
        }
        self.services.clear();
        if let Err(e) = self.socket.shutdown().await {
            trace!(error = %e, "socket shutdown failed");
        }
    }

    fn fail(self, stage: FailureStage, error: WsError) -> WsError {
        self.handle.set_state(ConversationState::Failed);
        record_conversation_failed(self.dialect().name(), stage);
        warn!(stage = stage.as_str(), error = %error, "conversation failed");
        // Dropping self drops the socket and every bound instance.
        error
    }

    async fn read_nonce(&mut self) -> WsResult<[u8; NONCE_LEN]> {
        let deadline = tokio::time::Instant::now() + self.config.nonce_timeout;
        while self.head.len() < NONCE_LEN {
            let read = tokio::time::timeout_at(deadline, self.socket.read_buf(&mut self.head))
                .await
                .map_err(|_| WsError::handshake_failed("timed out waiting for handshake nonce"))??;
            if read == 0 {
                return Err(WsError::handshake_failed(
                    "connection closed before handshake nonce",
                ));
            }
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&self.head.split_to(NONCE_LEN));
        Ok(nonce)
    }

    fn hub(&self) -> WsResult<Arc<Hub>> {
        self.hub.upgrade().ok_or(WsError::HubGone)
    }
}

impl<S> fmt::Debug for Conversation<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("token", &self.handle.token())
            .field("dialect", &self.handle.dialect())
            .field("state", &self.handle.state())
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_unique() {
        let a = ConversationToken::new();
        let b = ConversationToken::new();
        assert_ne!(a, b);
        assert_eq!(ConversationToken::from(a.as_uuid()), a);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            ConversationState::Created,
            ConversationState::Binding,
            ConversationState::Failed,
            ConversationState::Open,
            ConversationState::Closed,
        ] {
            assert_eq!(ConversationState::from_u8(state as u8), state);
        }
        assert!(ConversationState::Failed.is_terminal());
        assert!(!ConversationState::Open.is_terminal());
    }

    #[test]
    fn test_send_on_unopened_conversation() {
        let handle = ConversationHandle::detached(Dialect::Legacy);
        assert_eq!(handle.state(), ConversationState::Created);
        let err = handle.send(&Envelope::new("event")).unwrap_err();
        assert!(err.is_connection_closed());
        assert!(handle.ping().unwrap_err().is_connection_closed());
        assert!(handle.send_text("x").unwrap_err().is_connection_closed());
    }

    #[test]
    fn test_close_on_unopened_is_noop() {
        let handle = ConversationHandle::detached(Dialect::Legacy);
        handle.close();
        handle.close();
        assert_eq!(handle.state(), ConversationState::Created);
    }

    #[test]
    fn test_set_state_returns_previous() {
        let handle = ConversationHandle::detached(Dialect::Legacy);
        assert_eq!(handle.set_state(ConversationState::Open), ConversationState::Created);
        assert!(handle.is_open());
        assert_eq!(handle.set_state(ConversationState::Closed), ConversationState::Open);
        assert!(handle.send_text("late").unwrap_err().is_connection_closed());
    }
}
