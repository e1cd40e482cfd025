use crate::channel::ConnectionState;
use crate::wait::WaitError;
use imgdedup_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel is {0:?}, not open")]
    NotOpen(ConnectionState),
    #[error("outbound queue full")]
    Backpressure,
    #[error("socket thread is gone")]
    Disconnected,
    #[error("failed to spawn socket thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("protocol error: {0}")]
    ProtocolParse(#[from] ProtocolError),
    #[error("page element missing: {0}")]
    DomPreconditionMissing(String),
    #[error("not connected to the local service; request not sent")]
    RequestRejectedOffline,
    #[error("service version not verified yet; request not sent")]
    HandshakePending,
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Wait(#[from] WaitError),
}
