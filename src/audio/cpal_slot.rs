//! [`PlaybackSlot`] backed by a cpal output stream.
//!
//! Each slot decodes its source fully into memory and owns one output stream.
//! The engine thread talks to the audio callback only through atomics: read
//! head, target volume and the playing/looping flags.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};

use crate::audio::config::{FALLBACK_OUTPUT_SAMPLE_RATES, VOLUME_SMOOTHING_FACTOR};
use crate::audio::decoding::{self, DecodedTrack};
use crate::audio::errors::SlotError;
use crate::audio::slot::PlaybackSlot;
use crate::audio::types::{LoadOptions, SlotStatus};

// --- Lock-free Parameters ---

#[derive(Debug, Default)]
pub(crate) struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub(crate) fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }
    pub(crate) fn store(&self, value: f32, order: Ordering) {
        self.0.store(value.to_bits(), order)
    }
}

#[derive(Debug, Default)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }
    pub(crate) fn store(&self, value: f64, order: Ordering) {
        self.0.store(value.to_bits(), order)
    }
}

/// State shared between a slot and its audio callback.
#[derive(Debug, Default)]
pub(crate) struct SharedPlayback {
    /// Position in source frames, fractional.
    pub(crate) read_head: AtomicF64,
    pub(crate) target_volume: AtomicF32,
    pub(crate) is_playing: AtomicBool,
    pub(crate) looping: AtomicBool,
}

// --- Slot ---

pub struct CpalSlot {
    device: Device,
    stream: Option<Stream>,
    track: Option<Arc<DecodedTrack>>,
    shared: Arc<SharedPlayback>,
}

impl CpalSlot {
    /// Opens a slot on the default output device.
    pub fn new() -> Result<Self, SlotError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(SlotError::NoOutputDevice)?;
        match device.name() {
            Ok(name) => log::info!("CpalSlot: Using output device '{}'", name),
            Err(e) => log::warn!("CpalSlot: Output device name unavailable: {}", e),
        }
        Ok(CpalSlot {
            device,
            stream: None,
            track: None,
            shared: Arc::new(SharedPlayback::default()),
        })
    }

    /// Creates the pair the engine needs, both on the default device.
    pub fn pair() -> Result<(Self, Self), SlotError> {
        Ok((CpalSlot::new()?, CpalSlot::new()?))
    }

    fn loaded_track(&self) -> Result<&Arc<DecodedTrack>, SlotError> {
        self.track.as_ref().ok_or(SlotError::NotLoaded)
    }

    fn build_stream(
        &self,
        track: Arc<DecodedTrack>,
        initial_volume: f32,
    ) -> Result<Stream, SlotError> {
        let stream_config = choose_stream_config(&self.device, track.sample_rate)?;
        let output_channels = stream_config.channels as usize;
        let step = track.sample_rate as f64 / stream_config.sample_rate.0 as f64;
        if (step - 1.0).abs() > 0.01 {
            log::warn!(
                "CpalSlot: Sample rate mismatch. Track: {} Hz, stream: {} Hz, resampling linearly.",
                track.sample_rate,
                stream_config.sample_rate.0
            );
        }

        let shared = self.shared.clone();
        let mut current_gain = initial_volume;
        let data_callback = move |output: &mut [f32], _info: &cpal::OutputCallbackInfo| {
            render(output, output_channels, &track, &shared, &mut current_gain, step);
        };
        let error_callback = |err: cpal::StreamError| {
            log::error!("CpalSlot: Output stream error: {}", err);
        };
        let stream =
            self.device
                .build_output_stream(&stream_config, data_callback, error_callback, None)?;
        Ok(stream)
    }
}

impl PlaybackSlot for CpalSlot {
    async fn load(&mut self, source: &str, options: LoadOptions) -> Result<(), SlotError> {
        if self.stream.take().is_some() {
            log::debug!("CpalSlot: Dropped previous stream before loading '{}'", source);
        }
        self.track = None;
        self.shared.is_playing.store(false, Ordering::Relaxed);

        let path = source.strip_prefix("file://").unwrap_or(source).to_string();
        let decoded = tokio::task::spawn_blocking(move || decoding::decode_file(&path))
            .await
            .map_err(|e| SlotError::DecodeTaskPanic(e.to_string()))??;
        let track = Arc::new(decoded);

        let volume = options.volume.clamp(0.0, 1.0);
        self.shared.looping.store(options.looping, Ordering::Relaxed);
        self.shared.target_volume.store(volume, Ordering::Relaxed);
        self.shared.read_head.store(
            frame_for_position(options.position_ms, &track, options.looping),
            Ordering::Relaxed,
        );

        let stream = self.build_stream(track.clone(), volume)?;
        log::info!(
            "CpalSlot: Loaded '{}' ({} ms) at {} ms",
            source,
            track.duration_ms(),
            options.position_ms
        );
        self.stream = Some(stream);
        self.track = Some(track);
        Ok(())
    }

    async fn play(&mut self) -> Result<(), SlotError> {
        let stream = self.stream.as_ref().ok_or(SlotError::NotLoaded)?;
        stream.play()?;
        self.shared.is_playing.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), SlotError> {
        let stream = self.stream.as_ref().ok_or(SlotError::NotLoaded)?;
        self.shared.is_playing.store(false, Ordering::Relaxed);
        stream.pause()?;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SlotError> {
        self.shared.is_playing.store(false, Ordering::Relaxed);
        if let Some(stream) = self.stream.as_ref() {
            stream.pause()?;
        }
        Ok(())
    }

    async fn unload(&mut self) -> Result<(), SlotError> {
        self.shared.is_playing.store(false, Ordering::Relaxed);
        self.stream = None;
        self.track = None;
        self.shared.read_head.store(0.0, Ordering::Relaxed);
        Ok(())
    }

    async fn set_position(&mut self, position_ms: u64) -> Result<(), SlotError> {
        let track = self.loaded_track()?;
        let looping = self.shared.looping.load(Ordering::Relaxed);
        self.shared
            .read_head
            .store(frame_for_position(position_ms, track, looping), Ordering::Relaxed);
        Ok(())
    }

    async fn set_volume(&mut self, volume: f32) -> Result<(), SlotError> {
        self.shared
            .target_volume
            .store(volume.clamp(0.0, 1.0), Ordering::Relaxed);
        Ok(())
    }

    async fn status(&mut self) -> Result<SlotStatus, SlotError> {
        let volume = self.shared.target_volume.load(Ordering::Relaxed);
        let Some(track) = self.track.as_ref() else {
            return Ok(SlotStatus {
                volume,
                ..SlotStatus::default()
            });
        };
        let read_head = self.shared.read_head.load(Ordering::Relaxed);
        Ok(SlotStatus {
            is_loaded: true,
            is_playing: self.shared.is_playing.load(Ordering::Relaxed),
            position_ms: (read_head * 1000.0 / track.sample_rate as f64) as u64,
            duration_ms: Some(track.duration_ms()),
            volume,
        })
    }
}

// --- Helpers ---

pub(crate) fn frame_for_position(position_ms: u64, track: &DecodedTrack, looping: bool) -> f64 {
    let frames = track.frames() as u64;
    if frames == 0 {
        return 0.0;
    }
    let frame = position_ms * track.sample_rate as u64 / 1000;
    let frame = if looping {
        frame % frames
    } else {
        frame.min(frames)
    };
    frame as f64
}

/// Fills one output buffer. Linear interpolation between source frames,
/// per-frame gain smoothing toward the target volume.
pub(crate) fn render(
    output: &mut [f32],
    output_channels: usize,
    track: &DecodedTrack,
    shared: &SharedPlayback,
    current_gain: &mut f32,
    step: f64,
) {
    let frames = track.frames();
    if !shared.is_playing.load(Ordering::Relaxed) || frames == 0 || output_channels == 0 {
        output.iter_mut().for_each(|s| *s = 0.0);
        return;
    }
    let target_gain = shared.target_volume.load(Ordering::Relaxed);
    let looping = shared.looping.load(Ordering::Relaxed);
    let source_channels = track.channels;
    let mut read_head = shared.read_head.load(Ordering::Relaxed);
    let mut finished = false;

    for frame_out in output.chunks_mut(output_channels) {
        if read_head >= frames as f64 {
            if looping {
                read_head %= frames as f64;
            } else {
                finished = true;
            }
        }
        if finished {
            frame_out.iter_mut().for_each(|s| *s = 0.0);
            continue;
        }

        *current_gain += (target_gain - *current_gain) * VOLUME_SMOOTHING_FACTOR;
        let idx = read_head.floor() as usize;
        let next = if idx + 1 < frames {
            idx + 1
        } else if looping {
            0
        } else {
            idx
        };
        let fraction = read_head.fract() as f32;
        for (channel, sample_out) in frame_out.iter_mut().enumerate() {
            let source_channel = channel % source_channels;
            let y0 = track.samples[idx * source_channels + source_channel];
            let y1 = track.samples[next * source_channels + source_channel];
            *sample_out = (y0 + (y1 - y0) * fraction) * *current_gain;
        }
        read_head += step;
    }

    if finished {
        shared.is_playing.store(false, Ordering::Relaxed);
        read_head = frames as f64;
        log::debug!("CpalSlot: Track ended.");
    }
    shared.read_head.store(read_head, Ordering::Relaxed);
}

fn supports_rate(range: &SupportedStreamConfigRange, rate: u32) -> bool {
    range.min_sample_rate().0 <= rate && range.max_sample_rate().0 >= rate
}

/// Prefers stereo f32 at the track's own rate, then at the fallback rates,
/// then whatever the device reports as its default.
fn choose_stream_config(device: &Device, track_rate: u32) -> Result<StreamConfig, SlotError> {
    let supported_configs: Vec<SupportedStreamConfigRange> = match device.supported_output_configs() {
        Ok(configs) => configs
            .filter(|c| c.sample_format() == SampleFormat::F32)
            .collect(),
        Err(e) => {
            log::warn!("CpalSlot: Could not query supported configs, using default: {}", e);
            Vec::new()
        }
    };

    for rate in std::iter::once(track_rate).chain(FALLBACK_OUTPUT_SAMPLE_RATES) {
        let candidates = supported_configs.iter().filter(|c| supports_rate(c, rate));
        let best = candidates
            .clone()
            .find(|c| c.channels() == 2)
            .or_else(|| candidates.max_by_key(|c| c.channels()));
        if let Some(range) = best {
            return Ok(StreamConfig {
                channels: range.channels(),
                sample_rate: cpal::SampleRate(rate),
                buffer_size: cpal::BufferSize::Default,
            });
        }
    }

    let default_config = device
        .default_output_config()
        .map_err(|e| SlotError::NoStreamConfig(e.to_string()))?;
    log::warn!("CpalSlot: Using default output config as fallback: {:?}", default_config);
    Ok(default_config.config())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp_track() -> DecodedTrack {
        // Mono, 10 frames at 1 kHz: 0.0, 0.1, ... 0.9
        DecodedTrack {
            samples: (0..10).map(|i| i as f32 / 10.0).collect(),
            channels: 1,
            sample_rate: 1000,
        }
    }

    fn shared(volume: f32, looping: bool, read_head: f64) -> SharedPlayback {
        let shared = SharedPlayback::default();
        shared.target_volume.store(volume, Ordering::Relaxed);
        shared.looping.store(looping, Ordering::Relaxed);
        shared.read_head.store(read_head, Ordering::Relaxed);
        shared.is_playing.store(true, Ordering::Relaxed);
        shared
    }

    #[test]
    fn positions_wrap_when_looping_and_clamp_otherwise() {
        let track = ramp_track();
        assert_eq!(frame_for_position(4, &track, true), 4.0);
        assert_eq!(frame_for_position(13, &track, true), 3.0);
        assert_eq!(frame_for_position(13, &track, false), 10.0);
    }

    #[test]
    fn paused_slot_renders_silence() {
        let track = ramp_track();
        let state = shared(1.0, true, 2.0);
        state.is_playing.store(false, Ordering::Relaxed);
        let mut out = [1.0f32; 4];
        let mut gain = 1.0;
        render(&mut out, 2, &track, &state, &mut gain, 1.0);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(state.read_head.load(Ordering::Relaxed), 2.0);
    }

    #[test]
    fn mono_source_is_duplicated_and_interpolated() {
        let track = ramp_track();
        let state = shared(1.0, true, 2.5);
        let mut out = [0.0f32; 4];
        let mut gain = 1.0;
        render(&mut out, 2, &track, &state, &mut gain, 1.0);
        assert_abs_diff_eq!(out[0], 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(out[1], 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(out[2], 0.35, epsilon = 1e-6);
        assert_abs_diff_eq!(state.read_head.load(Ordering::Relaxed), 4.5);
    }

    #[test]
    fn looping_wraps_the_read_head() {
        let track = ramp_track();
        let state = shared(1.0, true, 9.0);
        let mut out = [0.0f32; 3];
        let mut gain = 1.0;
        render(&mut out, 1, &track, &state, &mut gain, 1.0);
        assert_abs_diff_eq!(out[1], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out[2], 0.1, epsilon = 1e-6);
        assert!(state.is_playing.load(Ordering::Relaxed));
    }

    #[test]
    fn non_looping_track_stops_at_the_end() {
        let track = ramp_track();
        let state = shared(1.0, false, 9.0);
        let mut out = [1.0f32; 3];
        let mut gain = 1.0;
        render(&mut out, 1, &track, &state, &mut gain, 1.0);
        assert_eq!(&out[1..], &[0.0, 0.0]);
        assert!(!state.is_playing.load(Ordering::Relaxed));
        assert_eq!(state.read_head.load(Ordering::Relaxed), 10.0);
    }

    #[test]
    fn gain_moves_smoothly_toward_target() {
        let track = ramp_track();
        let state = shared(0.0, true, 5.0);
        let mut out = [0.0f32; 4];
        let mut gain = 1.0;
        render(&mut out, 1, &track, &state, &mut gain, 0.0);
        assert!(gain < 1.0 && gain > 0.9);
        assert!(out[3] < out[0]);
    }
}
