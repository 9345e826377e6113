// Terminal state machine: UNREGISTERED → REGISTERED → BOUND

use super::{ClientError, ClientTransport};
use crate::protocol::{
    dg_lab_client_qrcode, dump_add_pulses, dump_clear_pulses, dump_strength_operation,
    parse_feedback_data, parse_strength_data, Channel, Envelope, FeedbackButton, MessageBody,
    MessageType, PayloadError, PayloadHead, PulseOperation, RetCode, Sentinel, StrengthData,
    StrengthOperationType, MAX_PULSES_PER_MESSAGE, MAX_STRENGTH_VALUE,
};
use futures::Stream;
use tracing::{debug, info};
use uuid::Uuid;

/// Data a bound terminal receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalEvent {
    /// Current strengths and limits reported by the app
    Strength(StrengthData),
    /// A feedback button was pressed on the app
    Feedback(FeedbackButton),
    /// The app went away (`ClientDisconnected`)
    Break(RetCode),
    /// Heartbeat from the hub (`Success`)
    Heartbeat(RetCode),
}

/// Which kind of [`TerminalEvent`] an event is, for filtering streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalEventKind {
    Strength,
    Feedback,
    Break,
    Heartbeat,
}

impl TerminalEvent {
    pub fn kind(&self) -> TerminalEventKind {
        match self {
            TerminalEvent::Strength(_) => TerminalEventKind::Strength,
            TerminalEvent::Feedback(_) => TerminalEventKind::Feedback,
            TerminalEvent::Break(_) => TerminalEventKind::Break,
            TerminalEvent::Heartbeat(_) => TerminalEventKind::Heartbeat,
        }
    }
}

/// Terminal side of a terminal/app pair
pub struct TerminalClient<T> {
    transport: T,
    client_id: Option<Uuid>,
    target_id: Option<Uuid>,
}

impl<T: ClientTransport> TerminalClient<T> {
    /// Unregistered client; the hub assigns the id
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            client_id: None,
            target_id: None,
        }
    }

    /// Client whose id is already known
    pub fn with_client_id(transport: T, client_id: Uuid) -> Self {
        Self {
            transport,
            client_id: Some(client_id),
            target_id: None,
        }
    }

    pub fn client_id(&self) -> Option<Uuid> {
        self.client_id
    }

    /// Id of the bound app
    pub fn target_id(&self) -> Option<Uuid> {
        self.target_id
    }

    pub fn is_registered(&self) -> bool {
        self.client_id.is_some()
    }

    pub fn is_bound(&self) -> bool {
        self.client_id.is_some() && self.target_id.is_some()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// QR payload for the app.
    ///
    /// `uri` is the hub address the app should dial; when omitted the
    /// transport's own hub URI is used. `None` until registered.
    pub fn qrcode(&self, uri: Option<&str>) -> Option<String> {
        let client_id = self.client_id?;
        let uri = uri.or_else(|| self.transport.server_uri())?;
        Some(dg_lab_client_qrcode(uri, client_id))
    }

    /// Wait for the hub to assign this terminal its id
    pub async fn register(&mut self) -> Result<Uuid, ClientError> {
        loop {
            if let Some(id) = self.client_id {
                return Ok(id);
            }
            let envelope = self.transport.recv().await?;
            if envelope.kind() == MessageType::Bind
                && envelope.body() == &MessageBody::Token(Sentinel::TargetId)
            {
                self.client_id = envelope.client_id();
                if let Some(id) = self.client_id {
                    info!(client = %id, "registered with hub");
                }
            }
        }
    }

    /// Wait for the result of the next bind attempt on this terminal.
    ///
    /// The app's id is stored only on success; the code is returned either
    /// way.
    pub async fn bind(&mut self) -> Result<RetCode, ClientError> {
        self.register().await?;
        if self.is_bound() {
            return Ok(RetCode::Success);
        }

        loop {
            let envelope = self.recv_owned().await?;
            if envelope.kind() != MessageType::Bind {
                continue;
            }
            if let Some(code) = envelope.body().as_code() {
                if code.is_success() {
                    self.target_id = envelope.target_id();
                    if let Some(target) = self.target_id {
                        info!(target = %target, "bound to app");
                    }
                } else {
                    debug!(%code, "bind attempt failed");
                }
                return Ok(code);
            }
        }
    }

    /// Register and bind as needed until bound to an app
    pub async fn ensure_bind(&mut self) -> Result<(), ClientError> {
        loop {
            if !self.is_registered() {
                self.register().await?;
            } else if !self.is_bound() {
                self.bind().await?;
            } else {
                return Ok(());
            }
        }
    }

    /// Next piece of data from the app or hub, oldest first.
    ///
    /// A `Break` event clears the binding; the next call waits for a new
    /// app to bind.
    pub async fn recv_data(&mut self) -> Result<TerminalEvent, ClientError> {
        self.ensure_bind().await?;
        loop {
            let envelope = self.recv_owned().await?;
            if let Some(event) = self.interpret(&envelope)? {
                return Ok(event);
            }
        }
    }

    /// [`recv_data`](Self::recv_data) as a stream; ends when the connection
    /// closes
    pub fn events(&mut self) -> impl Stream<Item = Result<TerminalEvent, ClientError>> + '_ {
        self.events_of(&[])
    }

    /// Like [`events`](Self::events), keeping only events of the given
    /// kinds. An empty `kinds` keeps everything; errors always come through.
    pub fn events_of<'a>(
        &'a mut self,
        kinds: &'a [TerminalEventKind],
    ) -> impl Stream<Item = Result<TerminalEvent, ClientError>> + 'a {
        futures::stream::unfold(self, move |client| async move {
            loop {
                match client.recv_data().await {
                    Err(ClientError::ConnectionClosed) => return None,
                    Ok(event) if !kinds.is_empty() && !kinds.contains(&event.kind()) => {
                        debug!(kind = ?event.kind(), "event filtered out");
                    }
                    item => return Some((item, client)),
                }
            }
        })
    }

    /// Change the strength of one channel (`value` at most 200)
    pub async fn set_strength(
        &mut self,
        channel: Channel,
        operation_type: StrengthOperationType,
        value: u8,
    ) -> Result<(), ClientError> {
        if value > MAX_STRENGTH_VALUE {
            return Err(ClientError::StrengthOutOfRange(value));
        }
        self.ensure_bind().await?;
        self.send_owned(dump_strength_operation(channel, operation_type, value))
            .await
    }

    /// Queue waveform steps (100ms each) on one channel
    pub async fn add_pulses(
        &mut self,
        channel: Channel,
        pulses: &[PulseOperation],
    ) -> Result<(), ClientError> {
        if pulses.len() > MAX_PULSES_PER_MESSAGE {
            return Err(ClientError::TooManyPulses(pulses.len()));
        }
        self.ensure_bind().await?;
        self.send_owned(dump_add_pulses(channel, pulses)).await
    }

    /// Drop the queued waveform of one channel
    pub async fn clear_pulses(&mut self, channel: Channel) -> Result<(), ClientError> {
        self.ensure_bind().await?;
        self.send_owned(dump_clear_pulses(channel)).await
    }

    async fn recv_owned(&mut self) -> Result<Envelope, ClientError> {
        loop {
            let envelope = self.transport.recv().await?;
            if envelope.client_id() == self.client_id {
                return Ok(envelope);
            }
            debug!(kind = %envelope.kind(), "skipping envelope addressed elsewhere");
        }
    }

    async fn send_owned(&mut self, body: String) -> Result<(), ClientError> {
        let envelope = Envelope::new(MessageType::Msg, self.client_id, self.target_id, body);
        self.transport.send(envelope).await
    }

    fn interpret(&mut self, envelope: &Envelope) -> Result<Option<TerminalEvent>, PayloadError> {
        match envelope.kind() {
            MessageType::Msg => match envelope.body().as_text() {
                Some(text) if text.starts_with(PayloadHead::Strength.as_str()) => {
                    parse_strength_data(text).map(|data| Some(TerminalEvent::Strength(data)))
                }
                Some(text) if text.starts_with(PayloadHead::Feedback.as_str()) => {
                    parse_feedback_data(text).map(|button| Some(TerminalEvent::Feedback(button)))
                }
                _ => Ok(None),
            },
            MessageType::Break => Ok(envelope.body().as_code().map(|code| {
                info!(%code, "app disconnected");
                self.target_id = None;
                TerminalEvent::Break(code)
            })),
            MessageType::Heartbeat => Ok(envelope.body().as_code().map(TerminalEvent::Heartbeat)),
            _ => Ok(None),
        }
    }
}
