use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Version spoken by this side of the socket. Bump whenever a frame shape changes.
pub const PROTOCOL_VERSION: i64 = 3;

pub const CONNECTED: &str = "connected";
pub const RELOAD: &str = "reload";
pub const VERSION_REQUEST: &str = "version_request";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("invalid data for action '{action}': {source}")]
    InvalidData {
        action: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Untyped command frames. They travel as bare strings, never as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawCommand {
    Connected,
    Reload,
    Unknown(String),
}

impl RawCommand {
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            CONNECTED => RawCommand::Connected,
            RELOAD => RawCommand::Reload,
            _ => RawCommand::Unknown(text.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RawCommand::Connected => CONNECTED,
            RawCommand::Reload => RELOAD,
            RawCommand::Unknown(s) => s,
        }
    }
}

/// `{ "action": ..., "data": ... }` before the data is decoded for its action.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    pub action: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Structured(Envelope),
    Raw(RawCommand),
}

impl InboundFrame {
    /// Structured parse is always tried first; anything that is not a JSON
    /// object with a string `action` is taken verbatim as a raw command.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => InboundFrame::Structured(envelope),
            Err(_) => InboundFrame::Raw(RawCommand::parse(text)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Toast,
    VersionResult,
    FindDuplicateImagesResult,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [
        ActionKind::Toast,
        ActionKind::VersionResult,
        ActionKind::FindDuplicateImagesResult,
    ];

    pub fn from_action(action: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == action)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Toast => "toast",
            ActionKind::VersionResult => "version_result",
            ActionKind::FindDuplicateImagesResult => "find_duplicate_images_result",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "action", content = "data")]
pub enum ServerMessage {
    /// Rich text, may contain HTML.
    Toast(String),
    VersionResult(VersionToken),
    FindDuplicateImagesResult(DuplicateReport),
}

impl ServerMessage {
    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Some(kind) = ActionKind::from_action(&envelope.action) else {
            return Err(ProtocolError::UnknownAction(envelope.action));
        };
        let Envelope { action, data } = envelope;
        let invalid = |source| ProtocolError::InvalidData {
            action: action.clone(),
            source,
        };
        let msg = match kind {
            ActionKind::Toast => {
                ServerMessage::Toast(serde_json::from_value(data).map_err(invalid)?)
            }
            ActionKind::VersionResult => ServerMessage::VersionResult(VersionToken(data)),
            ActionKind::FindDuplicateImagesResult => {
                let report = serde_json::from_value(data).map_err(invalid)?;
                ServerMessage::FindDuplicateImagesResult(report)
            }
        };
        Ok(msg)
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ServerMessage::Toast(_) => ActionKind::Toast,
            ServerMessage::VersionResult(_) => ActionKind::VersionResult,
            ServerMessage::FindDuplicateImagesResult(_) => ActionKind::FindDuplicateImagesResult,
        }
    }

    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Whatever the service put in `version_result.data`. Only integer-like
/// values are usable for comparison.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct VersionToken(pub Value);

impl VersionToken {
    pub fn as_version(&self) -> Option<i64> {
        match &self.0 {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl From<i64> for VersionToken {
    fn from(v: i64) -> Self {
        VersionToken(Value::from(v))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DuplicateReport {
    pub duplicate_images: Vec<String>,
    pub sorted_images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_images_grouped: Option<Vec<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "action", content = "data")]
pub enum ClientCommand {
    FindDuplicateImages(DuplicateQuery),
}

impl ClientCommand {
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateQuery {
    pub images: Vec<String>,
    pub image_type: ImageType,
    pub min_similarity_threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

/// Frames the service side can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    VersionRequest,
    Command(ClientCommand),
    Unknown(String),
}

impl ClientFrame {
    pub fn parse(text: &str) -> Self {
        if let Ok(cmd) = serde_json::from_str::<ClientCommand>(text) {
            return ClientFrame::Command(cmd);
        }
        if text.trim() == VERSION_REQUEST {
            return ClientFrame::VersionRequest;
        }
        ClientFrame::Unknown(text.to_string())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    Backdrop,
    Poster,
    Logo,
    Profile,
}

impl ImageType {
    pub const ALL: [ImageType; 4] = [
        ImageType::Backdrop,
        ImageType::Poster,
        ImageType::Logo,
        ImageType::Profile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ImageType::Backdrop => "backdrop",
            ImageType::Poster => "poster",
            ImageType::Logo => "logo",
            ImageType::Profile => "profile",
        }
    }

    /// Default similarity cutoff in percent. Portraits look alike, so they get a stricter one.
    pub fn default_threshold_percent(self) -> u8 {
        match self {
            ImageType::Profile => 95,
            _ => 85,
        }
    }

    /// Image pages end in `/images/<category>s`, e.g. `/movie/603/images/posters`.
    pub fn from_page_path(path: &str) -> Option<Self> {
        path.split('/')
            .rev()
            .filter(|s| !s.is_empty())
            .find_map(|segment| {
                let singular = segment.strip_suffix('s').unwrap_or(segment);
                singular.parse().ok()
            })
    }
}

impl FromStr for ImageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        ImageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown image type: {s}"))
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
