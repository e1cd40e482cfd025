mod channel;
mod config;
mod dom;
mod error;
mod main_loop;
pub mod mock_service;
mod negotiator;
mod net;
mod notify;
mod protocol;
mod reconciler;
mod router;
mod threshold;
mod wait;

pub use crate::channel::{Channel, ChannelEvent, ConnectionState, StateChange};
pub use crate::config::{
    AgentConfig, ConfigOverrides, DEFAULT_IMAGE_TYPE, DEFAULT_PAGE_URL, DEFAULT_WS_URL,
};
pub use crate::dom::{GalleryDom, ItemId, MemoryGallery};
pub use crate::error::{AgentError, TransportError};
pub use crate::main_loop::{Agent, UiEvent};
pub use crate::negotiator::{
    decide, outcome_notice, HandshakeState, NegotiationEvent, NegotiationStep, VersionNegotiator,
};
pub use crate::net::NetworkThread;
pub use crate::notify::{LogNotifier, Notifier, ToastLevel};
pub use crate::protocol::{TransportEvent, INBOUND_CAP, OUTBOUND_CAP};
pub use crate::reconciler::{
    filename_from_href, request_duplicate_check, ApplyOutcome, ImageCatalog, Reconciler, SortState,
};
pub use crate::router::{DiscardReason, MessageRouter, Routed, Subscription, SubscriptionId};
pub use crate::threshold::{EntryOutcome, ThresholdConfig, ThresholdControl, WidgetValues};
pub use crate::wait::{wait_until, CancelToken, WaitError, WaitPolicy};
