use crate::protocol::{ActionKind, RawCommand, ServerMessage};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use imgdedup_protocol::{InboundFrame, ProtocolError};
use tracing::{debug, warn};

pub type SubscriptionId = u64;

/// A feature's handle on one action. Dropping it is enough to stop delivery;
/// `MessageRouter::unsubscribe` does it eagerly.
pub struct Subscription {
    id: SubscriptionId,
    action: ActionKind,
    rx: Receiver<ServerMessage>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn action(&self) -> ActionKind {
        self.action
    }

    pub fn try_recv(&self) -> Option<ServerMessage> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn drain(&self) -> Vec<ServerMessage> {
        self.rx.try_iter().collect()
    }
}

struct Subscriber {
    id: SubscriptionId,
    action: ActionKind,
    tx: Sender<ServerMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    UnknownAction(String),
    InvalidData(String),
    UnknownCommand(String),
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Delivered { action: ActionKind, subscribers: usize },
    /// Raw `connected`: the service is ready for the handshake.
    ServiceConnected,
    /// Raw `reload`: the page has to be reloaded.
    Reload,
    Discarded(DiscardReason),
}

/// Classifies inbound frames and fans structured actions out to every
/// subscriber of that action.
#[derive(Default)]
pub struct MessageRouter {
    subscribers: Vec<Subscriber>,
    next_id: SubscriptionId,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, action: ActionKind) -> Subscription {
        self.next_id += 1;
        let id = self.next_id;
        let (tx, rx) = unbounded();
        self.subscribers.push(Subscriber { id, action, tx });
        debug!(id, %action, "subscribed");
        Subscription { id, action, rx }
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        before != self.subscribers.len()
    }

    pub fn subscriber_count(&self, action: ActionKind) -> usize {
        self.subscribers.iter().filter(|s| s.action == action).count()
    }

    pub fn dispatch(&mut self, frame: &str) -> Routed {
        match InboundFrame::parse(frame) {
            InboundFrame::Structured(envelope) => match ServerMessage::from_envelope(envelope) {
                Ok(msg) => {
                    let action = msg.kind();
                    let subscribers = self.publish(msg);
                    Routed::Delivered {
                        action,
                        subscribers,
                    }
                }
                Err(ProtocolError::UnknownAction(action)) => {
                    warn!(%action, "unknown action, discarded");
                    Routed::Discarded(DiscardReason::UnknownAction(action))
                }
                Err(e) => {
                    warn!("protocol parse failure: {e}");
                    Routed::Discarded(DiscardReason::InvalidData(e.to_string()))
                }
            },
            InboundFrame::Raw(RawCommand::Connected) => Routed::ServiceConnected,
            InboundFrame::Raw(RawCommand::Reload) => Routed::Reload,
            InboundFrame::Raw(RawCommand::Unknown(text)) => {
                warn!(frame = %text, "unknown raw command, discarded");
                Routed::Discarded(DiscardReason::UnknownCommand(text))
            }
        }
    }

    fn publish(&mut self, msg: ServerMessage) -> usize {
        let action = msg.kind();
        let mut delivered = 0;
        self.subscribers.retain(|s| {
            if s.action != action {
                return true;
            }
            if s.tx.send(msg.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                debug!(id = s.id, %action, "subscriber went away, pruning");
                false
            }
        });
        if delivered == 0 {
            debug!(%action, "no subscribers");
        }
        delivered
    }
}
