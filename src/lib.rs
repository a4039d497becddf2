pub mod audio;

pub use audio::config::{EngineConfig, PositionSharing};
pub use audio::cpal_slot::CpalSlot;
pub use audio::errors::{ConfigError, EngineError, SlotError};
pub use audio::fade::FadeCurve;
pub use audio::playback::{CrossfadePlayer, EngineEvent};
pub use audio::registry::TrackRegistry;
pub use audio::slot::PlaybackSlot;
pub use audio::types::{LoadOptions, PlayerStatus, SlotId, SlotStatus, Variant};

/// Installs the `env_logger` backend, `info` unless `RUST_LOG` says otherwise.
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
