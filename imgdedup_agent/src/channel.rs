use crate::error::TransportError;
use crate::net::NetworkThread;
use crate::protocol::{TransportEvent, INBOUND_CAP, OUTBOUND_CAP};
use crossbeam_channel::{bounded, never, Receiver, Sender, TryRecvError, TrySendError};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl StateChange {
    /// Only a drop after a successful open counts as losing the connection.
    /// A socket that never opened is not a regression.
    pub fn is_lost(&self) -> bool {
        self.from == ConnectionState::Open && self.to == ConnectionState::Closed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    StateChanged(StateChange),
    Message(String),
}

type MessageHandler = Box<dyn FnMut(&str)>;
type StateHandler = Box<dyn FnMut(StateChange)>;

/// The single persistent connection to the local service.
///
/// State only moves forward: `Connecting -> Open -> Closed` (or straight to
/// `Closed` when the socket never opens). There is no reconnect; a closed
/// channel has to be replaced by a fresh one.
pub struct Channel {
    url: String,
    state: ConnectionState,
    inbound_rx: Receiver<TransportEvent>,
    outbound_tx: Sender<String>,
    net: Option<NetworkThread>,
    message_handlers: Vec<MessageHandler>,
    state_handlers: Vec<StateHandler>,
}

impl Channel {
    pub fn open(url: &str) -> Result<Self, TransportError> {
        let (in_tx, in_rx) = bounded(INBOUND_CAP);
        let (out_tx, out_rx) = bounded(OUTBOUND_CAP);

        let net = NetworkThread::spawn(url, in_tx, out_rx)?;
        let mut channel = Self::from_parts(url, in_rx, out_tx);
        channel.net = Some(net);
        Ok(channel)
    }

    /// Builds a channel over an arbitrary transport pair. The other ends stand
    /// in for the socket thread.
    pub fn from_parts(
        url: &str,
        inbound_rx: Receiver<TransportEvent>,
        outbound_tx: Sender<String>,
    ) -> Self {
        Self {
            url: url.to_string(),
            state: ConnectionState::Connecting,
            inbound_rx,
            outbound_tx,
            net: None,
            message_handlers: Vec::new(),
            state_handlers: Vec::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn send(&self, payload: impl Into<String>) -> Result<(), TransportError> {
        if self.state != ConnectionState::Open {
            return Err(TransportError::NotOpen(self.state));
        }
        self.outbound_tx
            .try_send(payload.into())
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::Backpressure,
                TrySendError::Disconnected(_) => TransportError::Disconnected,
            })
    }

    pub fn on_message(&mut self, handler: impl FnMut(&str) + 'static) {
        self.message_handlers.push(Box::new(handler));
    }

    pub fn on_state_change(&mut self, handler: impl FnMut(StateChange) + 'static) {
        self.state_handlers.push(Box::new(handler));
    }

    /// Drains whatever the transport reported since the last call, applies the
    /// state transitions and runs the registered handlers. The events are also
    /// returned, in arrival order, for the owner to act on.
    pub fn poll(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        loop {
            match self.inbound_rx.try_recv() {
                Ok(TransportEvent::Opened) => self.transition(ConnectionState::Open, &mut events),
                Ok(TransportEvent::Frame(text)) => {
                    if self.state != ConnectionState::Open {
                        debug!(state = ?self.state, "dropping frame outside open state");
                        continue;
                    }
                    for handler in &mut self.message_handlers {
                        handler(&text);
                    }
                    events.push(ChannelEvent::Message(text));
                }
                Ok(TransportEvent::Closed) => self.transition(ConnectionState::Closed, &mut events),
                Ok(TransportEvent::Failed(reason)) => {
                    error!(url = %self.url, "transport failed to open: {reason}");
                    self.transition(ConnectionState::Closed, &mut events);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.transition(ConnectionState::Closed, &mut events);
                    break;
                }
            }
        }
        events
    }

    /// Tears the socket down. Returns the transition, if there was one.
    /// Undelivered inbound events are discarded.
    pub fn close(&mut self) -> Option<StateChange> {
        // Drop the receiver first so a socket thread blocked on a full queue
        // wakes up before we join it.
        drop(std::mem::replace(&mut self.inbound_rx, never()));
        if let Some(net) = self.net.take() {
            net.shutdown();
        }
        let mut events = Vec::new();
        self.transition(ConnectionState::Closed, &mut events);
        events.into_iter().find_map(|e| match e {
            ChannelEvent::StateChanged(change) => Some(change),
            ChannelEvent::Message(_) => None,
        })
    }

    fn transition(&mut self, to: ConnectionState, events: &mut Vec<ChannelEvent>) {
        let from = self.state;
        if from == to || from == ConnectionState::Closed {
            return;
        }
        self.state = to;
        let change = StateChange { from, to };

        match (from, to) {
            (_, ConnectionState::Open) => info!(url = %self.url, "channel open"),
            (ConnectionState::Open, ConnectionState::Closed) => {
                warn!(url = %self.url, "channel lost")
            }
            _ => error!(url = %self.url, "channel closed before it ever opened"),
        }

        for handler in &mut self.state_handlers {
            handler(change);
        }
        events.push(ChannelEvent::StateChanged(change));
    }
}
