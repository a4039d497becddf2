use serde::{Deserialize, Serialize};
use std::fmt;

// --- Variant ---

/// Name of one selectable audio program (e.g. "guided", "birth").
///
/// The set of variants is fixed by the engine configuration; the engine never
/// interprets the name itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Variant(String);

impl Variant {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Variant {
    fn from(name: &str) -> Self {
        Variant(name.to_string())
    }
}

impl From<String> for Variant {
    fn from(name: String) -> Self {
        Variant(name)
    }
}

// --- Slots ---

/// One of the two playback slots owned by the engine.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    A,
    B,
}

impl SlotId {
    pub fn other(self) -> SlotId {
        match self {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::A,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            SlotId::A => 0,
            SlotId::B => 1,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotId::A => f.write_str("A"),
            SlotId::B => f.write_str("B"),
        }
    }
}

/// Parameters applied by [`PlaybackSlot::load`](crate::audio::slot::PlaybackSlot::load).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadOptions {
    pub position_ms: u64,
    pub volume: f32,
    pub looping: bool,
}

/// Snapshot reported by a playback slot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SlotStatus {
    pub is_loaded: bool,
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub volume: f32,
}

// --- State Definitions ---

/// What the control surface exposes to the UI layer.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatus {
    pub current_variant: Variant,
    pub ready: bool,
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub transitioning: bool,
    pub init_error: Option<String>,
}

impl PlayerStatus {
    pub(crate) fn initial(variant: Variant) -> Self {
        PlayerStatus {
            current_variant: variant,
            ready: false,
            is_playing: false,
            position_ms: 0,
            duration_ms: None,
            transitioning: false,
            init_error: None,
        }
    }
}
