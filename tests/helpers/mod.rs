//! Test helpers for crossfade engine integration tests
//!
//! - MockSlot: recording `PlaybackSlot` with failure injection, driven by
//!   tokio's clock so paused-time tests see deterministic positions
//! - start_engine: spawns an engine on the current `LocalSet` and waits for it

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use moonrise_audio_lib::{
    CrossfadePlayer, EngineConfig, EngineEvent, LoadOptions, PlaybackSlot, SlotError, SlotStatus,
    Variant,
};
use tokio::sync::broadcast;
use tokio::time::Instant;

pub const TRACK_DURATION_MS: u64 = 600_000;

/// One recorded call on a mock slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotCall {
    Load { source: String, options: LoadOptions },
    Play,
    Pause,
    Stop,
    Unload,
    SetPosition(u64),
    SetVolume(f32),
}

#[derive(Debug)]
struct MockState {
    calls: Vec<SlotCall>,
    source: Option<String>,
    volume: f32,
    looping: bool,
    playing_since: Option<Instant>,
    anchor_position_ms: u64,
    duration_ms: u64,
    volume_before_load: Vec<f32>,
    failing_sources: HashSet<String>,
    fail_set_volume: bool,
    load_delay: Option<Duration>,
    volume_delay: Option<Duration>,
}

impl MockState {
    fn position_ms(&self) -> u64 {
        let mut position = self.anchor_position_ms;
        if let Some(since) = self.playing_since {
            position += since.elapsed().as_millis() as u64;
        }
        if self.looping && self.duration_ms > 0 {
            position % self.duration_ms
        } else {
            position.min(self.duration_ms)
        }
    }

    fn freeze(&mut self) {
        self.anchor_position_ms = self.position_ms();
        self.playing_since = None;
    }
}

/// Recording in-memory slot. Clones share state, so a test keeps one clone
/// for inspection and hands the other to the engine.
#[derive(Debug, Clone)]
pub struct MockSlot {
    name: &'static str,
    state: Rc<RefCell<MockState>>,
}

impl MockSlot {
    pub fn new(name: &'static str) -> Self {
        MockSlot {
            name,
            state: Rc::new(RefCell::new(MockState {
                calls: Vec::new(),
                source: None,
                volume: 1.0,
                looping: false,
                playing_since: None,
                anchor_position_ms: 0,
                duration_ms: TRACK_DURATION_MS,
                volume_before_load: Vec::new(),
                failing_sources: HashSet::new(),
                fail_set_volume: false,
                load_delay: None,
                volume_delay: None,
            })),
        }
    }

    // --- Failure injection ---

    pub fn fail_source(&self, source: &str) {
        self.state.borrow_mut().failing_sources.insert(source.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.borrow_mut();
        state.failing_sources.clear();
        state.fail_set_volume = false;
    }

    pub fn fail_set_volume(&self, fail: bool) {
        self.state.borrow_mut().fail_set_volume = fail;
    }

    pub fn delay_loads(&self, delay: Duration) {
        self.state.borrow_mut().load_delay = Some(delay);
    }

    /// Makes every `set_volume` take `delay` before it applies.
    pub fn delay_set_volume(&self, delay: Duration) {
        self.state.borrow_mut().volume_delay = Some(delay);
    }

    // --- Inspection ---

    pub fn calls(&self) -> Vec<SlotCall> {
        self.state.borrow().calls.clone()
    }

    pub fn loaded_source(&self) -> Option<String> {
        self.state.borrow().source.clone()
    }

    pub fn volume(&self) -> f32 {
        self.state.borrow().volume
    }

    pub fn is_playing(&self) -> bool {
        self.state.borrow().playing_since.is_some()
    }

    pub fn position_ms(&self) -> u64 {
        self.state.borrow().position_ms()
    }

    pub fn loads(&self) -> Vec<(String, LoadOptions)> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                SlotCall::Load { source, options } => Some((source.clone(), *options)),
                _ => None,
            })
            .collect()
    }

    pub fn last_load(&self) -> Option<(String, LoadOptions)> {
        self.loads().pop()
    }

    /// Volume the slot had just before each load.
    pub fn volumes_before_load(&self) -> Vec<f32> {
        self.state.borrow().volume_before_load.clone()
    }

    fn record(&self, call: SlotCall) {
        self.state.borrow_mut().calls.push(call);
    }

    fn require_loaded(&self) -> Result<(), SlotError> {
        if self.state.borrow().source.is_none() {
            return Err(SlotError::NotLoaded);
        }
        Ok(())
    }
}

impl PlaybackSlot for MockSlot {
    async fn load(&mut self, source: &str, options: LoadOptions) -> Result<(), SlotError> {
        self.record(SlotCall::Load {
            source: source.to_string(),
            options,
        });
        let delay = {
            let mut state = self.state.borrow_mut();
            let volume = state.volume;
            state.volume_before_load.push(volume);
            state.load_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.borrow_mut();
        if state.failing_sources.contains(source) {
            return Err(SlotError::Backend(format!(
                "{}: injected load failure for '{}'",
                self.name, source
            )));
        }
        state.source = Some(source.to_string());
        state.volume = options.volume;
        state.looping = options.looping;
        state.anchor_position_ms = options.position_ms;
        state.playing_since = None;
        Ok(())
    }

    async fn play(&mut self) -> Result<(), SlotError> {
        self.record(SlotCall::Play);
        self.require_loaded()?;
        let mut state = self.state.borrow_mut();
        if state.playing_since.is_none() {
            state.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), SlotError> {
        self.record(SlotCall::Pause);
        self.require_loaded()?;
        self.state.borrow_mut().freeze();
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SlotError> {
        self.record(SlotCall::Stop);
        self.state.borrow_mut().freeze();
        Ok(())
    }

    async fn unload(&mut self) -> Result<(), SlotError> {
        self.record(SlotCall::Unload);
        let mut state = self.state.borrow_mut();
        state.source = None;
        state.playing_since = None;
        state.anchor_position_ms = 0;
        Ok(())
    }

    async fn set_position(&mut self, position_ms: u64) -> Result<(), SlotError> {
        self.record(SlotCall::SetPosition(position_ms));
        self.require_loaded()?;
        let mut state = self.state.borrow_mut();
        state.anchor_position_ms = position_ms;
        if state.playing_since.is_some() {
            state.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    async fn set_volume(&mut self, volume: f32) -> Result<(), SlotError> {
        self.record(SlotCall::SetVolume(volume));
        let delay = self.state.borrow().volume_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.borrow_mut();
        if state.fail_set_volume {
            return Err(SlotError::Backend(format!("{}: injected volume failure", self.name)));
        }
        state.volume = volume;
        Ok(())
    }

    async fn status(&mut self) -> Result<SlotStatus, SlotError> {
        let state = self.state.borrow();
        Ok(SlotStatus {
            is_loaded: state.source.is_some(),
            is_playing: state.playing_since.is_some(),
            position_ms: state.position_ms(),
            duration_ms: state.source.as_ref().map(|_| state.duration_ms),
            volume: state.volume,
        })
    }
}

// --- Engine fixtures ---

pub fn source_for(variant: &str) -> String {
    format!("mem://{}", variant)
}

pub fn sources() -> Vec<(Variant, String)> {
    ["guided", "full", "birth", "life", "death"]
        .into_iter()
        .map(|name| (Variant::from(name), source_for(name)))
        .collect()
}

/// Starts on "guided" with a one second fade, like the album page does.
pub fn test_config() -> EngineConfig {
    EngineConfig::new(sources(), "guided").with_fade_duration_ms(1000)
}

pub struct TestEngine {
    pub player: CrossfadePlayer,
    pub a: MockSlot,
    pub b: MockSlot,
    pub events: broadcast::Receiver<EngineEvent>,
}

/// Spawns the engine on the current `LocalSet` without waiting for it.
pub fn spawn_engine(config: EngineConfig, a: MockSlot, b: MockSlot) -> TestEngine {
    let player = CrossfadePlayer::spawn_local(config, a.clone(), b.clone())
        .expect("config should be valid");
    let events = player.events();
    TestEngine {
        player,
        a,
        b,
        events,
    }
}

pub async fn start_engine(config: EngineConfig) -> TestEngine {
    let engine = spawn_engine(config, MockSlot::new("A"), MockSlot::new("B"));
    engine.player.wait_ready().await.expect("engine should become ready");
    engine
}

/// Lets simulated time pass while the engine keeps running.
pub async fn run_for(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

pub fn drain_events(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

pub fn completed(events: &[EngineEvent]) -> Vec<(u64, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::TransitionCompleted {
                generation,
                variant,
                ..
            } => Some((*generation, variant.to_string())),
            _ => None,
        })
        .collect()
}

pub fn abandoned(events: &[EngineEvent]) -> Vec<(u64, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::TransitionAbandoned {
                generation,
                variant,
            } => Some((*generation, variant.to_string())),
            _ => None,
        })
        .collect()
}

pub fn failed(events: &[EngineEvent]) -> Vec<(u64, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::TransitionFailed {
                generation,
                variant,
                ..
            } => Some((*generation, variant.to_string())),
            _ => None,
        })
        .collect()
}
