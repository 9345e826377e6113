//! Relay hub: connection, identity and binding state
//!
//! Every inbound envelope, networked or from a local terminal, goes through
//! [`RelayHub::handle`]. The hub owns the identity registry and the binding
//! table; nothing outside it mutates them.

use super::binding::BindingTable;
use super::connection::{PeerConnection, WireSink, DEFAULT_LOCAL_QUEUE_CAPACITY};
use super::registry::Registry;
use crate::client::{LocalTerminal, LocalTransport, TerminalClient};
use crate::protocol::{
    decode_envelope, decode_envelope_bytes, Envelope, MessageBody, MessageType, RetCode, Sentinel,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Callback fired with a peer id (connect / disconnect)
pub type PeerCallback = Arc<dyn Fn(Uuid) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Callback fired with the inbound envelope and whether it took effect
/// (bind succeeded / message forwarded)
pub type EnvelopeCallback =
    Arc<dyn Fn(Envelope, bool) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Hub tuning
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Inbound queue capacity of local terminals
    pub local_queue_capacity: usize,
    /// MESSAGE bodies longer than this are not relayed (None = no limit,
    /// the default)
    pub max_message_length: Option<usize>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            local_queue_capacity: DEFAULT_LOCAL_QUEUE_CAPACITY,
            max_message_length: None,
        }
    }
}

/// Statistics about hub operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayHubStats {
    /// Live networked peers (terminals and apps)
    pub networked_peers: usize,
    /// Live local terminals
    pub local_peers: usize,
    /// Current terminal/app bindings
    pub bindings: usize,
    /// MESSAGE envelopes forwarded to a counterpart
    pub envelopes_relayed: u64,
    /// Envelopes refused (malformed, unbound pair, too long)
    pub envelopes_rejected: u64,
}

#[derive(Default)]
struct Callbacks {
    connect: RwLock<Vec<PeerCallback>>,
    disconnect: RwLock<Vec<PeerCallback>>,
    bind: RwLock<Vec<EnvelopeCallback>>,
    message: RwLock<Vec<EnvelopeCallback>>,
}

pub struct RelayHub {
    config: HubConfig,
    registry: Registry,
    bindings: BindingTable,
    callbacks: Callbacks,
    envelopes_relayed: AtomicU64,
    envelopes_rejected: AtomicU64,
}

impl RelayHub {
    /// Create a hub with default configuration
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    pub fn with_config(config: HubConfig) -> Self {
        Self {
            config,
            registry: Registry::new(),
            bindings: BindingTable::new(),
            callbacks: Callbacks::default(),
            envelopes_relayed: AtomicU64::new(0),
            envelopes_rejected: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Networked peer lifecycle
    // ------------------------------------------------------------------

    /// Register a new networked connection.
    ///
    /// Issues a fresh id, tells the peer its id with a `targetId` bind
    /// envelope, then fires connect callbacks. The caller starts its read
    /// loop afterwards.
    pub async fn connect(&self, sink: Arc<dyn WireSink>) -> Uuid {
        let id = self.registry.register(Arc::clone(&sink));
        info!(peer = %id, "peer connected");

        if let Err(e) = PeerConnection::Networked(sink)
            .deliver(&Envelope::identity(id))
            .await
        {
            warn!(peer = %id, error = %e, "failed to send identity");
        }

        self.fire_peer(&self.callbacks.connect, "connect", id).await;
        id
    }

    /// Tear down a networked connection after transport closure.
    ///
    /// Removes the id, drops its binding and sends a `break` envelope to the
    /// orphaned counterpart.
    pub async fn disconnect(&self, id: Uuid) {
        if !self.registry.remove(&id) {
            debug!(peer = %id, "disconnect for unknown peer");
            return;
        }
        info!(peer = %id, "peer disconnected");

        self.release(id).await;
        self.fire_peer(&self.callbacks.disconnect, "disconnect", id).await;
    }

    // ------------------------------------------------------------------
    // Local terminals
    // ------------------------------------------------------------------

    /// Create a terminal colocated with the hub
    pub fn new_local_client(self: &Arc<Self>) -> LocalTerminal {
        self.new_local_client_with_capacity(self.config.local_queue_capacity)
    }

    /// Create a colocated terminal whose inbound queue holds `capacity`
    /// envelopes
    pub fn new_local_client_with_capacity(self: &Arc<Self>, capacity: usize) -> LocalTerminal {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.registry.register_local(tx);
        info!(peer = %id, capacity, "local terminal created");

        TerminalClient::with_client_id(LocalTransport::new(Arc::clone(self), rx), id)
    }

    /// Remove a local terminal, notifying its bound app.
    ///
    /// Returns false if `id` is not a registered local terminal.
    pub async fn remove_local_client(&self, id: &Uuid) -> bool {
        if !self.registry.remove_local(id) {
            return false;
        }
        info!(peer = %id, "local terminal removed");

        self.release(*id).await;
        true
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    /// Handle a text frame from networked peer `source`
    pub async fn handle_text(&self, text: &str, source: Uuid) {
        match decode_envelope(text) {
            Ok(envelope) => self.handle(envelope, Some(source)).await,
            Err(e) => self.reject_malformed(source, e).await,
        }
    }

    /// Handle a binary frame from networked peer `source`
    pub async fn handle_bytes(&self, bytes: &[u8], source: Uuid) {
        match decode_envelope_bytes(bytes) {
            Ok(envelope) => self.handle(envelope, Some(source)).await,
            Err(e) => self.reject_malformed(source, e).await,
        }
    }

    async fn reject_malformed(&self, source: Uuid, error: impl std::fmt::Display) {
        warn!(peer = %source, error = %error, "malformed envelope");
        self.envelopes_rejected.fetch_add(1, Ordering::Relaxed);
        self.deliver_networked(
            &source,
            &Envelope::notice(MessageType::Msg, RetCode::NonJsonContent),
        )
        .await;
    }

    /// Dispatch one envelope.
    ///
    /// `source` is the networked connection it arrived on, or `None` when a
    /// local terminal sent it.
    pub async fn handle(&self, envelope: Envelope, source: Option<Uuid>) {
        if let Some(src) = source {
            // Advisory only: the envelope is still processed below
            if self.registry.is_networked(&src)
                && envelope.client_id() != Some(src)
                && envelope.target_id() != Some(src)
            {
                debug!(peer = %src, "envelope names neither id of its sender");
                self.deliver_networked(
                    &src,
                    &Envelope::notice(MessageType::Msg, RetCode::RecipientNotFound),
                )
                .await;
            }
        }

        match envelope.kind() {
            MessageType::Bind => self.handle_bind(envelope, source).await,
            MessageType::Msg => self.handle_msg(envelope, source).await,
            kind => debug!(%kind, "dropping inbound envelope with no handler"),
        }
    }

    async fn handle_bind(&self, envelope: Envelope, source: Option<Uuid>) {
        if envelope.body() != &MessageBody::Token(Sentinel::DgLab) {
            return;
        }
        let Some((client_id, target_id)) = envelope.pair() else {
            return;
        };

        let registry = &self.registry;
        let result = self.bindings.try_bind(client_id, target_id, |c, t| {
            registry.contains(c) && registry.is_networked(t)
        });

        if result.is_success() {
            info!(client = %client_id, target = %target_id, "bound");
        } else {
            debug!(client = %client_id, target = %target_id, %result, "bind refused");
        }

        let response = envelope.reply(MessageType::Bind, result);
        if self.registry.is_networked(&client_id) {
            self.deliver_networked(&client_id, &response).await;
        } else {
            self.deliver_local(&client_id, &response).await;
        }
        if let Some(src) = source {
            self.deliver_networked(&src, &response).await;
        }

        self.fire_envelope(&self.callbacks.bind, "bind", envelope, result.is_success())
            .await;
    }

    async fn handle_msg(&self, envelope: Envelope, source: Option<Uuid>) {
        let Some((client_id, target_id)) = envelope.pair() else {
            return;
        };

        if !self.bindings.is_pair(&client_id, &target_id) {
            debug!(client = %client_id, target = %target_id, "message for unbound pair");
            let response = envelope.reply(MessageType::Bind, RetCode::IncompatibleRelationship);
            self.reply_to_sender(source, &response).await;
            self.envelopes_rejected.fetch_add(1, Ordering::Relaxed);
            self.fire_envelope(&self.callbacks.message, "message", envelope, false)
                .await;
            return;
        }

        if let Some(max) = self.config.max_message_length {
            if envelope.body().wire_len() > max {
                debug!(client = %client_id, len = envelope.body().wire_len(), "message too long");
                let response = envelope.reply(MessageType::Error, RetCode::MessageTooLong);
                self.reply_to_sender(source, &response).await;
                self.envelopes_rejected.fetch_add(1, Ordering::Relaxed);
                self.fire_envelope(&self.callbacks.message, "message", envelope, false)
                    .await;
                return;
            }
        }

        let forwarded = if source == Some(target_id) && self.registry.is_networked(&target_id) {
            // app -> terminal
            self.deliver_to(&client_id, &envelope).await
        } else {
            // terminal -> app
            self.deliver_networked(&target_id, &envelope).await
        };
        if forwarded {
            self.envelopes_relayed.fetch_add(1, Ordering::Relaxed);
        }

        self.fire_envelope(&self.callbacks.message, "message", envelope, forwarded)
            .await;
    }

    /// Drop `id`'s binding and notify the counterpart
    async fn release(&self, id: Uuid) {
        let Some(unbound) = self.bindings.unbind_by(&id) else {
            return;
        };
        let counterpart = unbound.counterpart_of(&id);
        info!(peer = %id, counterpart = %counterpart, "binding released");

        let notice = Envelope::disconnected(unbound.client_id, unbound.target_id);
        self.deliver_to(&counterpart, &notice).await;
    }

    // ------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------

    /// Send one heartbeat to every networked peer, one after another.
    ///
    /// Returns how many were delivered.
    pub async fn send_heartbeats(&self) -> usize {
        let mut delivered = 0;
        for (id, sink) in self.registry.networked_snapshot() {
            let heartbeat = Envelope::heartbeat(id, self.bindings.counterpart(&id));
            match PeerConnection::Networked(sink).deliver(&heartbeat).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(peer = %id, error = %e, "heartbeat send failed"),
            }
        }
        delivered
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    async fn send(&self, id: &Uuid, conn: PeerConnection, envelope: &Envelope) -> bool {
        match conn.deliver(envelope).await {
            Ok(()) => {
                debug!(peer = %id, kind = %envelope.kind(), local = conn.is_local(), "delivered");
                true
            }
            Err(e) => {
                warn!(peer = %id, kind = %envelope.kind(), error = %e, "delivery failed");
                false
            }
        }
    }

    /// Deliver to `id` over whichever connection it has
    async fn deliver_to(&self, id: &Uuid, envelope: &Envelope) -> bool {
        match self.registry.lookup(id) {
            Some(conn) => self.send(id, conn, envelope).await,
            None => {
                debug!(peer = %id, "no connection for recipient");
                false
            }
        }
    }

    async fn deliver_networked(&self, id: &Uuid, envelope: &Envelope) -> bool {
        match self.registry.networked(id) {
            Some(sink) => self.send(id, PeerConnection::Networked(sink), envelope).await,
            None => false,
        }
    }

    async fn deliver_local(&self, id: &Uuid, envelope: &Envelope) -> bool {
        match self.registry.local(id) {
            Some(queue) => self.send(id, PeerConnection::Local(queue), envelope).await,
            None => false,
        }
    }

    /// Answer the sender of `response`: its networked connection, or the
    /// local terminal named as client when a local terminal sent it
    async fn reply_to_sender(&self, source: Option<Uuid>, response: &Envelope) -> bool {
        match (source, response.client_id()) {
            (Some(src), _) => self.deliver_networked(&src, response).await,
            (None, Some(client_id)) => self.deliver_local(&client_id, response).await,
            (None, None) => false,
        }
    }

    // ------------------------------------------------------------------
    // Callbacks
    // ------------------------------------------------------------------

    /// Run `callback` after each networked peer is registered
    pub fn on_connect<F, Fut>(&self, callback: F)
    where
        F: Fn(Uuid) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: PeerCallback = Arc::new(move |id| callback(id).boxed());
        self.callbacks.connect.write().push(callback);
    }

    /// Run `callback` after a networked peer's disconnect is handled
    pub fn on_disconnect<F, Fut>(&self, callback: F)
    where
        F: Fn(Uuid) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: PeerCallback = Arc::new(move |id| callback(id).boxed());
        self.callbacks.disconnect.write().push(callback);
    }

    /// Run `callback` with every bind request and whether it succeeded
    pub fn on_bind<F, Fut>(&self, callback: F)
    where
        F: Fn(Envelope, bool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: EnvelopeCallback = Arc::new(move |e, ok| callback(e, ok).boxed());
        self.callbacks.bind.write().push(callback);
    }

    /// Run `callback` with every relay message and whether it was forwarded
    pub fn on_message<F, Fut>(&self, callback: F)
    where
        F: Fn(Envelope, bool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: EnvelopeCallback = Arc::new(move |e, ok| callback(e, ok).boxed());
        self.callbacks.message.write().push(callback);
    }

    async fn fire_peer(&self, slot: &RwLock<Vec<PeerCallback>>, event: &'static str, id: Uuid) {
        let callbacks: Vec<PeerCallback> = slot.read().clone();
        for callback in callbacks {
            if let Err(e) = callback(id).await {
                warn!(peer = %id, event, error = %e, "callback failed");
            }
        }
    }

    async fn fire_envelope(
        &self,
        slot: &RwLock<Vec<EnvelopeCallback>>,
        event: &'static str,
        envelope: Envelope,
        ok: bool,
    ) {
        let callbacks: Vec<EnvelopeCallback> = slot.read().clone();
        for callback in callbacks {
            if let Err(e) = callback(envelope.clone(), ok).await {
                warn!(event, error = %e, "callback failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Read-only snapshots
    // ------------------------------------------------------------------

    pub fn client_to_target(&self) -> HashMap<Uuid, Uuid> {
        self.bindings.client_to_target()
    }

    pub fn target_to_client(&self) -> HashMap<Uuid, Uuid> {
        self.bindings.target_to_client()
    }

    /// Ids of all networked peers, terminals and apps
    pub fn ws_client_ids(&self) -> HashSet<Uuid> {
        self.registry.networked_ids()
    }

    /// Ids of all local terminals
    pub fn local_client_ids(&self) -> HashSet<Uuid> {
        self.registry.local_ids()
    }

    pub fn stats(&self) -> RelayHubStats {
        RelayHubStats {
            networked_peers: self.registry.networked_count(),
            local_peers: self.registry.local_count(),
            bindings: self.bindings.len(),
            envelopes_relayed: self.envelopes_relayed.load(Ordering::Relaxed),
            envelopes_rejected: self.envelopes_rejected.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::super::connection::test_support::channel_sink;
    use super::*;
    use crate::client::ClientTransport;
    use crate::protocol::{decode_envelope, encode_envelope, MAX_MESSAGE_LENGTH};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Peer {
        id: Uuid,
        rx: UnboundedReceiver<String>,
    }

    impl Peer {
        async fn connect(hub: &RelayHub) -> Self {
            let (sink, mut rx) = channel_sink();
            let id = hub.connect(sink).await;
            let identity = decode_envelope(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(identity, Envelope::identity(id));
            Self { id, rx }
        }

        fn next(&mut self) -> Envelope {
            decode_envelope(&self.rx.try_recv().expect("expected an envelope")).unwrap()
        }

        fn assert_idle(&mut self) {
            assert!(self.rx.try_recv().is_err(), "unexpected envelope");
        }
    }

    async fn bound_pair(hub: &RelayHub) -> (Peer, Peer) {
        let mut terminal = Peer::connect(hub).await;
        let mut app = Peer::connect(hub).await;
        hub.handle(Envelope::bind_request(terminal.id, app.id), Some(app.id))
            .await;
        assert_eq!(terminal.next().body().as_code(), Some(RetCode::Success));
        assert_eq!(app.next().body().as_code(), Some(RetCode::Success));
        (terminal, app)
    }

    #[tokio::test]
    async fn test_bind_notifies_both_sides() {
        let hub = RelayHub::new();
        let (mut terminal, mut app) = bound_pair(&hub).await;

        assert_eq!(hub.client_to_target().get(&terminal.id), Some(&app.id));
        assert_eq!(hub.target_to_client().get(&app.id), Some(&terminal.id));
        terminal.assert_idle();
        app.assert_idle();
    }

    #[tokio::test]
    async fn test_bind_unknown_target() {
        let hub = RelayHub::new();
        let mut terminal = Peer::connect(&hub).await;
        let ghost = Uuid::new_v4();

        hub.handle(Envelope::bind_request(terminal.id, ghost), Some(terminal.id))
            .await;

        // Once for the client side, once for the source
        assert_eq!(terminal.next().body().as_code(), Some(RetCode::TargetClientNotFound));
        assert_eq!(terminal.next().body().as_code(), Some(RetCode::TargetClientNotFound));
        assert!(hub.client_to_target().is_empty());
    }

    #[tokio::test]
    async fn test_bind_already_bound() {
        let hub = RelayHub::new();
        let (mut terminal, _app) = bound_pair(&hub).await;
        let mut intruder = Peer::connect(&hub).await;

        hub.handle(Envelope::bind_request(terminal.id, intruder.id), Some(intruder.id))
            .await;

        assert_eq!(terminal.next().body().as_code(), Some(RetCode::IdAlreadyBound));
        assert_eq!(intruder.next().body().as_code(), Some(RetCode::IdAlreadyBound));
        assert_eq!(hub.client_to_target().len(), 1);
    }

    #[tokio::test]
    async fn test_bind_without_dglab_token_ignored() {
        let hub = RelayHub::new();
        let mut terminal = Peer::connect(&hub).await;
        let mut app = Peer::connect(&hub).await;

        let request = Envelope::new(MessageType::Bind, Some(terminal.id), Some(app.id), "hello");
        hub.handle(request, Some(app.id)).await;

        terminal.assert_idle();
        app.assert_idle();
        assert!(hub.client_to_target().is_empty());
    }

    #[tokio::test]
    async fn test_message_relayed_both_directions() {
        let hub = RelayHub::new();
        let (mut terminal, mut app) = bound_pair(&hub).await;

        let report = Envelope::message(terminal.id, app.id, "strength-5+5+100+100");
        hub.handle(report.clone(), Some(app.id)).await;
        assert_eq!(terminal.next(), report);
        app.assert_idle();

        let command = Envelope::message(terminal.id, app.id, "strength-1+2+50");
        hub.handle(command.clone(), Some(terminal.id)).await;
        assert_eq!(app.next(), command);
        terminal.assert_idle();

        assert_eq!(hub.stats().envelopes_relayed, 2);
    }

    #[tokio::test]
    async fn test_message_for_unbound_pair() {
        let hub = RelayHub::new();
        let mut terminal = Peer::connect(&hub).await;
        let mut app = Peer::connect(&hub).await;

        hub.handle(Envelope::message(terminal.id, app.id, "clear-1"), Some(app.id))
            .await;

        let response = app.next();
        assert_eq!(response.kind(), MessageType::Bind);
        assert_eq!(response.body().as_code(), Some(RetCode::IncompatibleRelationship));
        terminal.assert_idle();
        assert_eq!(hub.stats().envelopes_rejected, 1);
    }

    fn limited_hub() -> RelayHub {
        RelayHub::with_config(HubConfig {
            max_message_length: Some(MAX_MESSAGE_LENGTH),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_long_message_relayed_by_default() {
        let hub = Arc::new(RelayHub::new());
        let mut terminal = hub.new_local_client();
        let terminal_id = terminal.client_id().unwrap();
        let mut app = Peer::connect(&hub).await;

        hub.handle(Envelope::bind_request(terminal_id, app.id), Some(app.id))
            .await;
        assert_eq!(app.next().body().as_code(), Some(RetCode::Success));
        let bound = terminal.transport_mut().recv().await.unwrap();
        assert_eq!(bound.body().as_code(), Some(RetCode::Success));

        let long = Envelope::message(terminal_id, app.id, "x".repeat(MAX_MESSAGE_LENGTH + 59));
        hub.handle(long.clone(), Some(app.id)).await;

        assert_eq!(terminal.transport_mut().recv().await.unwrap(), long);
        app.assert_idle();
        assert_eq!(hub.stats().envelopes_rejected, 0);
    }

    #[tokio::test]
    async fn test_message_too_long() {
        let hub = limited_hub();
        let (mut terminal, mut app) = bound_pair(&hub).await;
        let body = "x".repeat(MAX_MESSAGE_LENGTH + 1);

        hub.handle(Envelope::message(terminal.id, app.id, body), Some(terminal.id))
            .await;

        let response = terminal.next();
        assert_eq!(response.kind(), MessageType::Error);
        assert_eq!(response.body().as_code(), Some(RetCode::MessageTooLong));
        app.assert_idle();
    }

    #[tokio::test]
    async fn test_long_message_for_unbound_pair_is_incompatible() {
        let hub = limited_hub();
        let terminal = Peer::connect(&hub).await;
        let mut app = Peer::connect(&hub).await;
        let body = "x".repeat(MAX_MESSAGE_LENGTH + 1);

        hub.handle(Envelope::message(terminal.id, app.id, body), Some(app.id))
            .await;

        let response = app.next();
        assert_eq!(response.kind(), MessageType::Bind);
        assert_eq!(response.body().as_code(), Some(RetCode::IncompatibleRelationship));
    }

    #[tokio::test]
    async fn test_origin_mismatch_is_advisory() {
        let hub = RelayHub::new();
        let (mut terminal, mut app) = bound_pair(&hub).await;
        let mut stranger = Peer::connect(&hub).await;

        let spoofed = Envelope::message(terminal.id, app.id, "strength-1+2+10");
        hub.handle(spoofed.clone(), Some(stranger.id)).await;

        let warning = stranger.next();
        assert_eq!(warning.kind(), MessageType::Msg);
        assert_eq!(warning.body().as_code(), Some(RetCode::RecipientNotFound));
        // Still forwarded terminal -> app
        assert_eq!(app.next(), spoofed);
        terminal.assert_idle();
    }

    #[tokio::test]
    async fn test_malformed_frame() {
        let hub = RelayHub::new();
        let mut peer = Peer::connect(&hub).await;

        hub.handle_text("{not json", peer.id).await;

        let response = peer.next();
        assert_eq!(response.kind(), MessageType::Msg);
        assert_eq!(response.body().as_code(), Some(RetCode::NonJsonContent));
        assert!(hub.ws_client_ids().contains(&peer.id));
    }

    #[tokio::test]
    async fn test_handle_text_parses_frame() {
        let hub = RelayHub::new();
        let mut terminal = Peer::connect(&hub).await;
        let mut app = Peer::connect(&hub).await;

        let frame = encode_envelope(&Envelope::bind_request(terminal.id, app.id)).unwrap();
        hub.handle_text(&frame, app.id).await;

        assert_eq!(terminal.next().body().as_code(), Some(RetCode::Success));
        assert_eq!(app.next().body().as_code(), Some(RetCode::Success));
    }

    #[tokio::test]
    async fn test_inbound_heartbeat_dropped() {
        let hub = RelayHub::new();
        let mut peer = Peer::connect(&hub).await;

        hub.handle(Envelope::heartbeat(peer.id, None), Some(peer.id)).await;
        peer.assert_idle();
    }

    #[tokio::test]
    async fn test_disconnect_sends_break_to_survivor() {
        let hub = RelayHub::new();
        let (terminal, mut app) = bound_pair(&hub).await;

        hub.disconnect(terminal.id).await;

        let notice = app.next();
        assert_eq!(notice, Envelope::disconnected(terminal.id, app.id));
        app.assert_idle();
        assert!(hub.client_to_target().is_empty());
        assert!(hub.target_to_client().is_empty());
        assert!(!hub.ws_client_ids().contains(&terminal.id));
    }

    #[tokio::test]
    async fn test_app_disconnect_keeps_role_order() {
        let hub = RelayHub::new();
        let (mut terminal, app) = bound_pair(&hub).await;

        hub.disconnect(app.id).await;

        let notice = terminal.next();
        assert_eq!(notice.kind(), MessageType::Break);
        assert_eq!(notice.client_id(), Some(terminal.id));
        assert_eq!(notice.target_id(), Some(app.id));
        assert_eq!(notice.body().as_code(), Some(RetCode::ClientDisconnected));
    }

    #[tokio::test]
    async fn test_heartbeat_names_counterpart() {
        let hub = RelayHub::new();
        let (mut terminal, mut app) = bound_pair(&hub).await;
        let mut loner = Peer::connect(&hub).await;

        assert_eq!(hub.send_heartbeats().await, 3);

        assert_eq!(terminal.next(), Envelope::heartbeat(terminal.id, Some(app.id)));
        assert_eq!(app.next(), Envelope::heartbeat(app.id, Some(terminal.id)));
        assert_eq!(loner.next(), Envelope::heartbeat(loner.id, None));
    }

    #[tokio::test]
    async fn test_callbacks_fire_and_failures_are_contained() {
        let hub = RelayHub::new();
        let connects = Arc::new(AtomicUsize::new(0));
        let binds = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&connects);
        hub.on_connect(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        hub.on_connect(|_| async { anyhow::bail!("broken callback") });
        let counter = Arc::clone(&binds);
        hub.on_bind(move |_, success| {
            let counter = Arc::clone(&counter);
            async move {
                if success {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        });
        let counter = Arc::clone(&disconnects);
        hub.on_disconnect(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let (terminal, _app) = bound_pair(&hub).await;
        hub.disconnect(terminal.id).await;

        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(binds.load(Ordering::SeqCst), 1);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_message_callback_reports_forwarding() {
        let hub = RelayHub::new();
        let outcomes = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        hub.on_message(move |_, forwarded| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(forwarded);
                Ok(())
            }
        });

        let (terminal, app) = bound_pair(&hub).await;
        hub.handle(Envelope::message(terminal.id, app.id, "clear-1"), Some(terminal.id))
            .await;
        hub.handle(Envelope::message(app.id, terminal.id, "clear-1"), Some(terminal.id))
            .await;

        assert_eq!(*outcomes.lock(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_stats() {
        let hub = Arc::new(RelayHub::new());
        let (_terminal, _app) = bound_pair(&hub).await;
        let _local = hub.new_local_client();

        let stats = hub.stats();
        assert_eq!(stats.networked_peers, 2);
        assert_eq!(stats.local_peers, 1);
        assert_eq!(stats.bindings, 1);
    }
}
