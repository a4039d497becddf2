use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::audio::errors::ConfigError;
use crate::audio::fade::FadeCurve;
use crate::audio::types::Variant;

// --- Crossfade Constants ---
pub const DEFAULT_FADE_DURATION_MS: u64 = 2000;
/// Shorter fades are raised to this so the ramp never divides by zero.
pub const MIN_FADE_DURATION_MS: u64 = 80;
/// Bounds on consecutive failed ramp writes before a ramp is abandoned. The
/// limit itself is a quarter of the ramp's ticks.
pub const MIN_CONSECUTIVE_FAILED_TICKS: u32 = 2;
pub const MAX_CONSECUTIVE_FAILED_TICKS: u32 = 30;

// --- Engine Thread Constants ---
pub const RAMP_TICK_INTERVAL_MS: u64 = 16; // ~60 FPS, one animation frame
pub const POSITION_POLL_INTERVAL_MS: u64 = 100;
pub const COMMAND_CHANNEL_CAPACITY: usize = 32;
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// --- Output Stream Constants ---
/// Per-frame smoothing toward the target volume inside the output callback.
/// Hides the 16ms staircase of ramp writes.
pub const VOLUME_SMOOTHING_FACTOR: f32 = 0.002;
pub const FALLBACK_OUTPUT_SAMPLE_RATES: [u32; 2] = [48000, 44100];

fn default_fade_duration_ms() -> u64 {
    DEFAULT_FADE_DURATION_MS
}
fn default_tick_interval_ms() -> u64 {
    RAMP_TICK_INTERVAL_MS
}
fn default_position_poll_interval_ms() -> u64 {
    POSITION_POLL_INTERVAL_MS
}
fn default_true() -> bool {
    true
}

/// How variants share resume positions.
///
/// `Shared` keeps every variant on one timeline: a switch seeks the incoming
/// track to where the outgoing one was. `Grouped` maps variants to group keys;
/// variants in the same group share a timeline, every unlisted variant keeps
/// a private one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum PositionSharing {
    #[default]
    Shared,
    Grouped { groups: HashMap<Variant, String> },
}

impl PositionSharing {
    pub fn group_key(&self, variant: &Variant) -> String {
        match self {
            PositionSharing::Shared => String::new(),
            PositionSharing::Grouped { groups } => match groups.get(variant) {
                Some(key) => format!("group:{}", key),
                None => format!("variant:{}", variant),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub sources: HashMap<Variant, String>,
    pub initial_variant: Variant,
    #[serde(default = "default_fade_duration_ms", alias = "crossfadeMs", alias = "overlapMs")]
    pub fade_duration_ms: u64,
    #[serde(rename = "loop", default = "default_true")]
    pub looping: bool,
    #[serde(default = "default_true")]
    pub auto_start: bool,
    #[serde(default)]
    pub fade_curve: FadeCurve,
    #[serde(default)]
    pub position_sharing: PositionSharing,
    #[serde(default)]
    pub seek_compensation_ms: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_position_poll_interval_ms")]
    pub position_poll_interval_ms: u64,
}

impl EngineConfig {
    pub fn new(
        sources: impl IntoIterator<Item = (Variant, String)>,
        initial_variant: impl Into<Variant>,
    ) -> Self {
        EngineConfig {
            sources: sources.into_iter().collect(),
            initial_variant: initial_variant.into(),
            fade_duration_ms: DEFAULT_FADE_DURATION_MS,
            looping: true,
            auto_start: true,
            fade_curve: FadeCurve::default(),
            position_sharing: PositionSharing::default(),
            seek_compensation_ms: 0,
            tick_interval_ms: RAMP_TICK_INTERVAL_MS,
            position_poll_interval_ms: POSITION_POLL_INTERVAL_MS,
        }
    }

    pub fn with_fade_duration_ms(mut self, fade_duration_ms: u64) -> Self {
        self.fade_duration_ms = fade_duration_ms;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_fade_curve(mut self, fade_curve: FadeCurve) -> Self {
        self.fade_curve = fade_curve;
        self
    }

    pub fn with_position_sharing(mut self, position_sharing: PositionSharing) -> Self {
        self.position_sharing = position_sharing;
        self
    }

    pub fn with_seek_compensation_ms(mut self, seek_compensation_ms: u64) -> Self {
        self.seek_compensation_ms = seek_compensation_ms;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        log::info!("Config: Loaded engine config from '{}'", path.display());
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        if let Some((variant, _)) = self.sources.iter().find(|(_, uri)| uri.trim().is_empty()) {
            return Err(ConfigError::EmptySource {
                variant: variant.clone(),
            });
        }
        if !self.sources.contains_key(&self.initial_variant) {
            return Err(ConfigError::UnknownVariant {
                variant: self.initial_variant.clone(),
            });
        }
        if let PositionSharing::Grouped { groups } = &self.position_sharing {
            if let Some(variant) = groups.keys().find(|v| !self.sources.contains_key(*v)) {
                return Err(ConfigError::UnknownVariant {
                    variant: variant.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn fade_duration(&self) -> Duration {
        let clamped = self.fade_duration_ms.max(MIN_FADE_DURATION_MS);
        if clamped != self.fade_duration_ms {
            log::debug!(
                "Config: Fade duration {}ms raised to minimum {}ms",
                self.fade_duration_ms,
                MIN_FADE_DURATION_MS
            );
        }
        Duration::from_millis(clamped)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn position_poll_interval(&self) -> Duration {
        Duration::from_millis(self.position_poll_interval_ms.max(1))
    }

    /// Consecutive failed volume writes a ramp tolerates before it is aborted.
    pub fn ramp_failure_limit(&self) -> u32 {
        let ticks = self.fade_duration().as_millis() / self.tick_interval().as_millis().max(1);
        let limit = u32::try_from(ticks / 4).unwrap_or(u32::MAX);
        limit.clamp(MIN_CONSECUTIVE_FAILED_TICKS, MAX_CONSECUTIVE_FAILED_TICKS)
    }
}
