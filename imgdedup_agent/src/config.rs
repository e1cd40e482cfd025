use crate::error::AgentError;
use crate::protocol::{ImageType, PROTOCOL_VERSION};
use crate::wait::WaitPolicy;
use std::time::Duration;
use tracing::warn;
use url::Url;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8765";
pub const DEFAULT_PAGE_URL: &str = "https://www.themoviedb.org/";
/// Used by the env layer when neither a setting nor the page path names a type.
pub const DEFAULT_IMAGE_TYPE: ImageType = ImageType::Poster;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub ws_url: String,
    /// Page the gallery lives on. Relative hrefs resolve against it.
    pub page_url: Url,
    pub image_type: ImageType,
    pub client_version: i64,
    pub wait: WaitPolicy,
}

/// Values that win over the environment, e.g. from command line flags.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub ws_url: Option<String>,
    pub page_url: Option<String>,
    pub image_type: Option<ImageType>,
    pub wait_ms: Option<u64>,
}

impl AgentConfig {
    /// The image type comes from `image_type` when given, otherwise from the
    /// page path (`.../images/posters` and friends).
    pub fn new(
        ws_url: &str,
        page_url: &str,
        image_type: Option<ImageType>,
    ) -> Result<Self, AgentError> {
        let page_url = parse_page_url(page_url)?;
        let image_type = image_type
            .or_else(|| ImageType::from_page_path(page_url.path()))
            .ok_or_else(|| {
                AgentError::Config(format!(
                    "cannot tell the image type from '{page_url}'; set it explicitly"
                ))
            })?;
        Ok(Self::build(ws_url, page_url, image_type))
    }

    /// Reads `IMGDEDUP_WS_URL`, `IMGDEDUP_PAGE_URL`, `IMGDEDUP_IMAGE_TYPE` and
    /// `IMGDEDUP_WAIT_MS`.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_env_with(ConfigOverrides::default())
    }

    pub fn from_env_with(overrides: ConfigOverrides) -> Result<Self, AgentError> {
        Self::from_lookup(|key| std::env::var(key).ok(), overrides)
    }

    /// Layers `overrides` over `lookup` over the built-in defaults. Unlike
    /// `new`, a page that names no image type falls back to
    /// `DEFAULT_IMAGE_TYPE`.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        overrides: ConfigOverrides,
    ) -> Result<Self, AgentError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let ws_url = overrides
            .ws_url
            .or_else(|| var("IMGDEDUP_WS_URL"))
            .unwrap_or_else(|| DEFAULT_WS_URL.to_string());
        let page_url = overrides
            .page_url
            .or_else(|| var("IMGDEDUP_PAGE_URL"))
            .unwrap_or_else(|| DEFAULT_PAGE_URL.to_string());
        let page_url = parse_page_url(&page_url)?;

        let image_type = match overrides.image_type {
            Some(t) => Some(t),
            None => var("IMGDEDUP_IMAGE_TYPE")
                .map(|s| s.parse::<ImageType>())
                .transpose()
                .map_err(AgentError::Config)?,
        };
        let image_type = match image_type.or_else(|| ImageType::from_page_path(page_url.path())) {
            Some(t) => t,
            None => {
                warn!(%page_url, default = %DEFAULT_IMAGE_TYPE, "page names no image type");
                DEFAULT_IMAGE_TYPE
            }
        };

        let mut config = Self::build(&ws_url, page_url, image_type);
        let wait_ms = match overrides.wait_ms {
            Some(ms) => Some(ms),
            None => var("IMGDEDUP_WAIT_MS")
                .map(|ms| ms.trim().parse::<u64>())
                .transpose()
                .map_err(|e| AgentError::Config(format!("IMGDEDUP_WAIT_MS: {e}")))?,
        };
        if let Some(ms) = wait_ms {
            config.wait.interval = Duration::from_millis(ms.max(1));
        }
        Ok(config)
    }

    pub fn default_threshold_percent(&self) -> u8 {
        self.image_type.default_threshold_percent()
    }

    fn build(ws_url: &str, page_url: Url, image_type: ImageType) -> Self {
        Self {
            ws_url: ws_url.to_string(),
            page_url,
            image_type,
            client_version: PROTOCOL_VERSION,
            wait: WaitPolicy::default(),
        }
    }
}

fn parse_page_url(page_url: &str) -> Result<Url, AgentError> {
    Url::parse(page_url)
        .map_err(|e| AgentError::Config(format!("invalid page url '{page_url}': {e}")))
}
