//! The playback primitive the engine drives.
//!
//! The engine owns exactly two values implementing [`PlaybackSlot`] and never
//! touches a device directly, so tests inject a recording mock and the binary
//! injects [`CpalSlot`](crate::audio::cpal_slot::CpalSlot).
//!
//! All methods are asynchronous media operations. The engine runs them on a
//! single thread (tokio `LocalSet`), so implementations need not be `Send`.

use crate::audio::errors::SlotError;
use crate::audio::types::{LoadOptions, SlotStatus};

#[allow(async_fn_in_trait)]
pub trait PlaybackSlot {
    /// Loads `source` paused, seeked to `options.position_ms`, at `options.volume`.
    async fn load(&mut self, source: &str, options: LoadOptions) -> Result<(), SlotError>;

    async fn play(&mut self) -> Result<(), SlotError>;

    async fn pause(&mut self) -> Result<(), SlotError>;

    /// Halts playback. Must succeed on a slot that is already stopped or empty.
    async fn stop(&mut self) -> Result<(), SlotError>;

    /// Releases the loaded source. Must succeed on an empty slot.
    async fn unload(&mut self) -> Result<(), SlotError>;

    async fn set_position(&mut self, position_ms: u64) -> Result<(), SlotError>;

    async fn set_volume(&mut self, volume: f32) -> Result<(), SlotError>;

    async fn status(&mut self) -> Result<SlotStatus, SlotError>;
}
