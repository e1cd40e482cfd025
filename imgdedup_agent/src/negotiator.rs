use crate::notify::ToastLevel;
use crate::protocol::VersionToken;
use std::cmp::Ordering;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Unverified,
    Compatible,
    ServerOutdated,
    ClientOutdated,
    Undetermined,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationEvent {
    ServiceConnected,
    VersionReported(VersionToken),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationStep {
    /// The owner has to send `version_request` over the channel.
    SendVersionRequest,
    Settled {
        outcome: HandshakeState,
        remote: VersionToken,
    },
    Ignored,
}

/// One-shot version check, one per connection. A new connection gets a new
/// negotiator.
#[derive(Debug, Clone)]
pub struct VersionNegotiator {
    local: i64,
    state: HandshakeState,
    requested: bool,
}

impl VersionNegotiator {
    pub fn new(local: i64) -> Self {
        Self {
            local,
            state: HandshakeState::Unverified,
            requested: false,
        }
    }

    pub fn local_version(&self) -> i64 {
        self.local
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_settled(&self) -> bool {
        self.state != HandshakeState::Unverified
    }

    /// Service toasts are only shown once the handshake reached an outcome.
    /// A mismatch still counts: the user is warned and work goes on.
    pub fn allows_service_toasts(&self) -> bool {
        self.is_settled()
    }

    pub fn handle(&mut self, event: NegotiationEvent) -> NegotiationStep {
        match event {
            NegotiationEvent::ServiceConnected => {
                if self.requested {
                    debug!("repeated connected signal ignored");
                    return NegotiationStep::Ignored;
                }
                self.requested = true;
                NegotiationStep::SendVersionRequest
            }
            NegotiationEvent::VersionReported(remote) => {
                if self.is_settled() {
                    debug!(?remote, "version already settled, ignoring");
                    return NegotiationStep::Ignored;
                }
                if !self.requested {
                    warn!(?remote, "version result arrived before it was requested");
                }
                let outcome = decide(self.local, remote.as_version());
                self.state = outcome;
                match outcome {
                    HandshakeState::Compatible => {
                        info!(local = self.local, "service version compatible")
                    }
                    HandshakeState::Undetermined => {
                        error!(?remote, "could not determine service version")
                    }
                    _ => warn!(local = self.local, ?remote, ?outcome, "version mismatch"),
                }
                NegotiationStep::Settled { outcome, remote }
            }
        }
    }
}

pub fn decide(local: i64, remote: Option<i64>) -> HandshakeState {
    let Some(remote) = remote else {
        return HandshakeState::Undetermined;
    };
    match local.cmp(&remote) {
        Ordering::Equal => HandshakeState::Compatible,
        Ordering::Greater => HandshakeState::ServerOutdated,
        Ordering::Less => HandshakeState::ClientOutdated,
    }
}

/// The user-facing notice for a settled handshake, if any.
pub fn outcome_notice(
    outcome: HandshakeState,
    local: i64,
    remote: &VersionToken,
) -> Option<(ToastLevel, String)> {
    match outcome {
        HandshakeState::Unverified | HandshakeState::Compatible => None,
        HandshakeState::ServerOutdated => Some((
            ToastLevel::Warning,
            format!(
                "The local service is outdated (v{remote}, this script expects v{local}). \
                 Please update the server."
            ),
        )),
        HandshakeState::ClientOutdated => Some((
            ToastLevel::Warning,
            format!(
                "This script is outdated (v{local}, the local service is v{remote}). \
                 Please update the client script."
            ),
        )),
        HandshakeState::Undetermined => Some((
            ToastLevel::Error,
            format!(
                "Could not determine the local service version (got '{remote}'). \
                 Please file a report."
            ),
        )),
    }
}
