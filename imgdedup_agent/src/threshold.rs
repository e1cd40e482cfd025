use crate::protocol::ImageType;
use tracing::debug;

pub const MIN_PERCENT: u8 = 1;
pub const MAX_PERCENT: u8 = 100;

/// Similarity cutoff sent to the service, in [0.01, 1.00].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdConfig(f64);

impl ThresholdConfig {
    pub fn from_percent(percent: u8) -> Self {
        Self(f64::from(percent.clamp(MIN_PERCENT, MAX_PERCENT)) / 100.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

/// What the two widgets currently show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetValues {
    pub entry: String,
    pub slider: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Accepted(u8),
    /// Input rejected; both widgets show the last valid value again.
    Reverted(u8),
}

/// Free-form entry and slider writing through to one percent value.
#[derive(Debug, Clone)]
pub struct ThresholdControl {
    percent: u8,
    widgets: WidgetValues,
}

impl ThresholdControl {
    pub fn new(percent: u8) -> Self {
        let percent = percent.clamp(MIN_PERCENT, MAX_PERCENT);
        Self {
            percent,
            widgets: WidgetValues {
                entry: percent.to_string(),
                slider: percent,
            },
        }
    }

    pub fn for_image_type(image_type: ImageType) -> Self {
        Self::new(image_type.default_threshold_percent())
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn threshold(&self) -> ThresholdConfig {
        ThresholdConfig::from_percent(self.percent)
    }

    pub fn widgets(&self) -> &WidgetValues {
        &self.widgets
    }

    /// Only plain digit strings are taken; anything else puts the last valid
    /// value back into both widgets.
    pub fn set_from_entry(&mut self, text: &str) -> EntryOutcome {
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            debug!(input = %text, percent = self.percent, "threshold entry rejected");
            self.mirror();
            return EntryOutcome::Reverted(self.percent);
        }
        // All digits, so parsing can only fail on overflow.
        let requested = text.parse::<u64>().unwrap_or(u64::MAX);
        self.percent = clamp_percent(requested);
        self.mirror();
        EntryOutcome::Accepted(self.percent)
    }

    pub fn set_from_slider(&mut self, position: i64) -> u8 {
        self.percent = clamp_percent(u64::try_from(position).unwrap_or(0));
        self.mirror();
        self.percent
    }

    fn mirror(&mut self) {
        self.widgets.entry = self.percent.to_string();
        self.widgets.slider = self.percent;
    }
}

fn clamp_percent(value: u64) -> u8 {
    // Clamped first, so the narrowing cast cannot truncate.
    value.clamp(u64::from(MIN_PERCENT), u64::from(MAX_PERCENT)) as u8
}
