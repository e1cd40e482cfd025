pub const INBOUND_CAP: usize = 256;
pub const OUTBOUND_CAP: usize = 256;

/// What the socket thread reports back to the channel owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Closed,
    /// The socket never opened.
    Failed(String),
}

pub use imgdedup_protocol::{
    ActionKind, ClientCommand, DuplicateQuery, DuplicateReport, ImageType, RawCommand,
    ServerMessage, VersionToken, PROTOCOL_VERSION, VERSION_REQUEST,
};
