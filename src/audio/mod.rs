pub mod config;
pub mod cpal_slot;
pub mod decoding;
pub mod errors;
pub mod fade;
pub mod playback;
pub mod registry;
pub mod slot;
pub mod types;
