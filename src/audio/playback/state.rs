use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::time::Instant;

use super::commands::EngineCommand;
use super::events::EngineEvent;
use super::position::PositionTracker;
use super::volume::VolumeWriter;
use crate::audio::config::EngineConfig;
use crate::audio::errors::SlotError;
use crate::audio::registry::TrackRegistry;
use crate::audio::slot::PlaybackSlot;
use crate::audio::types::{LoadOptions, PlayerStatus, SlotId, Variant};

/// A slot shared between the engine loop and the preparation task working on it.
/// The async mutex keeps operations on one slot strictly in request order.
pub(crate) type SharedSlot<S> = Rc<Mutex<S>>;

// --- Slot Pair ---

pub(crate) struct DualSlots<S> {
    slots: [SharedSlot<S>; 2],
    writers: [Rc<VolumeWriter>; 2],
    live: SlotId,
}

impl<S> DualSlots<S> {
    pub(crate) fn new(slot_a: S, slot_b: S) -> Self {
        DualSlots {
            slots: [Rc::new(Mutex::new(slot_a)), Rc::new(Mutex::new(slot_b))],
            writers: Default::default(),
            live: SlotId::A,
        }
    }

    pub(crate) fn live_id(&self) -> SlotId {
        self.live
    }

    pub(crate) fn standby_id(&self) -> SlotId {
        self.live.other()
    }

    pub(crate) fn get(&self, id: SlotId) -> SharedSlot<S> {
        self.slots[id.index()].clone()
    }

    pub(crate) fn live(&self) -> SharedSlot<S> {
        self.get(self.live)
    }

    pub(crate) fn set_live(&mut self, id: SlotId) {
        self.live = id;
    }

    pub(crate) fn writer(&self, id: SlotId) -> &VolumeWriter {
        &self.writers[id.index()]
    }

    /// Hands a gain to the slot's background writer without waiting for it.
    pub(crate) fn submit_volume(&self, id: SlotId, volume: f32)
    where
        S: PlaybackSlot + 'static,
    {
        self.writers[id.index()].submit(self.get(id), id, volume);
    }

    /// Drops every ramp gain not yet written to either slot.
    pub(crate) fn clear_volume_writes(&self) {
        for writer in &self.writers {
            writer.clear();
        }
    }
}

// --- Transition State ---

#[derive(Debug, Clone)]
pub(crate) struct TransitionState {
    pub(crate) generation: u64,
    pub(crate) target: Variant,
    pub(crate) from: SlotId,
    pub(crate) to: SlotId,
    pub(crate) started_at: Instant,
    pub(crate) duration: Duration,
    /// Consecutive failed writes on either slot that abort the ramp.
    pub(crate) failure_limit: u32,
}

#[derive(Debug, Default)]
pub(crate) enum TransitionPhase {
    #[default]
    Idle,
    /// Standby slot is being stopped, loaded, seeked and started.
    Preparing { generation: u64, target: Variant },
    Ramping(TransitionState),
}

impl TransitionPhase {
    pub(crate) fn target(&self) -> Option<&Variant> {
        match self {
            TransitionPhase::Idle => None,
            TransitionPhase::Preparing { target, .. } => Some(target),
            TransitionPhase::Ramping(t) => Some(&t.target),
        }
    }

    pub(crate) fn generation(&self) -> Option<u64> {
        match self {
            TransitionPhase::Idle => None,
            TransitionPhase::Preparing { generation, .. } => Some(*generation),
            TransitionPhase::Ramping(t) => Some(t.generation),
        }
    }
}

/// Work order for the task that prepares the standby slot.
#[derive(Debug, Clone)]
pub(crate) struct PrepareRequest {
    pub(crate) generation: u64,
    pub(crate) target: Variant,
    pub(crate) slot_id: SlotId,
    pub(crate) source: String,
    pub(crate) options: LoadOptions,
    pub(crate) start_playing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrepareStatus {
    /// Loaded, seeked and silent; `playing` tells whether it was started.
    Ready { playing: bool },
    Superseded,
}

#[derive(Debug)]
pub(crate) struct PrepareOutcome {
    pub(crate) generation: u64,
    pub(crate) target: Variant,
    pub(crate) slot_id: SlotId,
    pub(crate) result: Result<PrepareStatus, SlotError>,
}

// --- Engine Wiring ---

/// Everything the engine thread needs that is created on the caller's side.
pub(crate) struct EngineParts {
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) registry: Arc<TrackRegistry>,
    pub(crate) command_receiver: mpsc::Receiver<EngineCommand>,
    pub(crate) status: watch::Sender<PlayerStatus>,
    pub(crate) events: broadcast::Sender<EngineEvent>,
}

impl EngineParts {
    /// Reports a failure that happened before the engine state could be built.
    pub(crate) fn fail_initialization(&self, message: &str) {
        log::error!("Engine: Initialization failed: {}", message);
        self.status.send_modify(|status| {
            status.ready = false;
            status.init_error = Some(message.to_string());
        });
        super::events::emit_error_event(&self.events, message);
    }
}

// --- Engine State ---

pub(crate) struct EngineState<S> {
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) registry: Arc<TrackRegistry>,
    pub(crate) slots: DualSlots<S>,
    pub(crate) current_variant: Variant,
    pub(crate) ready: bool,
    pub(crate) is_playing: bool,
    /// Shared with preparation tasks so they can notice they were superseded.
    pub(crate) generation: Rc<Cell<u64>>,
    pub(crate) phase: TransitionPhase,
    pub(crate) positions: PositionTracker,
    pub(crate) events: broadcast::Sender<EngineEvent>,
    pub(crate) status: watch::Sender<PlayerStatus>,
    pub(crate) prepared_sender: mpsc::UnboundedSender<PrepareOutcome>,
}

impl<S: PlaybackSlot + 'static> EngineState<S> {
    pub(crate) fn new(
        config: Arc<EngineConfig>,
        registry: Arc<TrackRegistry>,
        status: watch::Sender<PlayerStatus>,
        events: broadcast::Sender<EngineEvent>,
        slot_a: S,
        slot_b: S,
    ) -> (Self, mpsc::UnboundedReceiver<PrepareOutcome>) {
        let (prepared_sender, prepared_receiver) = mpsc::unbounded_channel();
        let positions = PositionTracker::new(
            config.position_sharing.clone(),
            config.looping,
            config.seek_compensation_ms,
        );
        let state = EngineState {
            current_variant: config.initial_variant.clone(),
            config,
            registry,
            slots: DualSlots::new(slot_a, slot_b),
            ready: false,
            is_playing: false,
            generation: Rc::new(Cell::new(0)),
            phase: TransitionPhase::Idle,
            positions,
            events,
            status,
            prepared_sender,
        };
        (state, prepared_receiver)
    }
}

impl<S> EngineState<S> {
    pub(crate) fn bump_generation(&self) -> u64 {
        let next = self.generation.get() + 1;
        self.generation.set(next);
        next
    }

    pub(crate) fn is_ramping(&self) -> bool {
        matches!(self.phase, TransitionPhase::Ramping(_))
    }

    /// Pushes the engine-owned fields into the status channel.
    pub(crate) fn sync_status(&self) {
        let current_variant = &self.current_variant;
        let ready = self.ready;
        let is_playing = self.is_playing;
        let transitioning = !matches!(self.phase, TransitionPhase::Idle);
        self.status.send_if_modified(|status| {
            let before = status.clone();
            status.current_variant = current_variant.clone();
            status.ready = ready;
            status.is_playing = is_playing;
            status.transitioning = transitioning;
            *status != before
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_and_standby_are_always_distinct() {
        let mut slots = DualSlots::new("first", "second");
        assert_eq!(slots.live_id(), SlotId::A);
        assert_eq!(slots.standby_id(), SlotId::B);
        slots.set_live(slots.standby_id());
        assert_eq!(slots.live_id(), SlotId::B);
        assert_eq!(slots.standby_id(), SlotId::A);
        assert!(Rc::ptr_eq(&slots.live(), &slots.get(SlotId::B)));
    }

    #[test]
    fn phase_exposes_pending_generation_and_target() {
        assert_eq!(TransitionPhase::Idle.generation(), None);
        let phase = TransitionPhase::Preparing {
            generation: 4,
            target: Variant::from("life"),
        };
        assert_eq!(phase.generation(), Some(4));
        assert_eq!(phase.target(), Some(&Variant::from("life")));
    }
}
