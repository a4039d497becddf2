use std::collections::HashMap;
use tokio::time::Instant;

use super::state::EngineState;
use crate::audio::config::PositionSharing;
use crate::audio::slot::PlaybackSlot;
use crate::audio::types::{SlotStatus, Variant};

#[derive(Debug, Clone, Copy)]
struct PositionSample {
    position_ms: u64,
    sampled_at: Instant,
    advancing: bool,
    /// Set while the group's variant is not audible.
    frozen: bool,
    duration_ms: Option<u64>,
}

impl PositionSample {
    fn estimate_at(&self, now: Instant, looping: bool) -> u64 {
        let mut position = self.position_ms;
        if self.advancing && !self.frozen {
            position += now.saturating_duration_since(self.sampled_at).as_millis() as u64;
        }
        match self.duration_ms {
            Some(duration) if duration > 0 && looping => position % duration,
            Some(duration) => position.min(duration),
            None => position,
        }
    }
}

/// Cached playback offsets, one per position group.
///
/// Only the tracked variant (the one audible in the live slot) writes into
/// the cache. When a transition starts the tracked group is frozen at that
/// instant, so leaving and later re-entering a group resumes where it left off.
#[derive(Debug)]
pub(crate) struct PositionTracker {
    sharing: PositionSharing,
    looping: bool,
    compensation_ms: u64,
    samples: HashMap<String, PositionSample>,
    tracked: Option<Variant>,
}

impl PositionTracker {
    pub(crate) fn new(sharing: PositionSharing, looping: bool, compensation_ms: u64) -> Self {
        PositionTracker {
            sharing,
            looping,
            compensation_ms,
            samples: HashMap::new(),
            tracked: None,
        }
    }

    pub(crate) fn track(&mut self, variant: &Variant) {
        self.tracked = Some(variant.clone());
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> Option<&Variant> {
        self.tracked.as_ref()
    }

    pub(crate) fn record(&mut self, variant: &Variant, status: &SlotStatus) {
        if self.tracked.as_ref() != Some(variant) || !status.is_loaded {
            return;
        }
        let key = self.sharing.group_key(variant);
        self.samples.insert(
            key,
            PositionSample {
                position_ms: status.position_ms,
                sampled_at: Instant::now(),
                advancing: status.is_playing,
                frozen: false,
                duration_ms: status.duration_ms,
            },
        );
    }

    /// Freezes the tracked group at its current estimate and stops tracking.
    pub(crate) fn release(&mut self) {
        let Some(variant) = self.tracked.take() else {
            return;
        };
        let now = Instant::now();
        let key = self.sharing.group_key(&variant);
        if let Some(sample) = self.samples.get_mut(&key) {
            sample.position_ms = sample.estimate_at(now, self.looping);
            sample.sampled_at = now;
            sample.frozen = true;
        }
    }

    /// Resumes tracking a variant that stayed audible after [`release`](Self::release).
    /// Extrapolation continues from the moment it was frozen.
    pub(crate) fn reclaim(&mut self, variant: &Variant) {
        if let Some(sample) = self.samples.get_mut(&self.sharing.group_key(variant)) {
            sample.frozen = false;
        }
        self.tracked = Some(variant.clone());
    }

    pub(crate) fn estimate(&self, variant: &Variant) -> u64 {
        self.samples
            .get(&self.sharing.group_key(variant))
            .map(|sample| sample.estimate_at(Instant::now(), self.looping))
            .unwrap_or(0)
    }

    /// Where the incoming variant should start. Compensation for load latency
    /// only applies when the incoming track continues the timeline that is
    /// still audible.
    pub(crate) fn seek_target(&self, incoming: &Variant, outgoing: &Variant, outgoing_playing: bool) -> u64 {
        let base = self.estimate(incoming);
        if self.shares_timeline(incoming, outgoing) && outgoing_playing {
            base + self.compensation_ms
        } else {
            base
        }
    }

    /// Seek target for a standby started after the live slot resumed. On a
    /// shared timeline it follows the live slot, otherwise the incoming
    /// variant's own cached position.
    pub(crate) fn late_start_target(
        &self,
        incoming: &Variant,
        outgoing: &Variant,
        live_position_ms: u64,
    ) -> u64 {
        if self.shares_timeline(incoming, outgoing) {
            live_position_ms + self.compensation_ms
        } else {
            self.estimate(incoming)
        }
    }

    fn shares_timeline(&self, a: &Variant, b: &Variant) -> bool {
        self.sharing.group_key(a) == self.sharing.group_key(b)
    }
}

// Reads the live slot and refreshes both the position cache and the UI status.
pub(crate) async fn process_position_poll<S: PlaybackSlot + 'static>(state: &mut EngineState<S>) {
    if !state.ready {
        return;
    }
    let live = state.slots.live();
    // A slot busy with a slow write is sampled on a later poll.
    let Ok(mut slot) = live.try_lock() else {
        log::trace!("Engine: Live slot {} busy, skipping position poll", state.slots.live_id());
        return;
    };
    let status = slot.status().await;
    drop(slot);
    match status {
        Ok(slot_status) => {
            state.positions.record(&state.current_variant, &slot_status);
            state.status.send_if_modified(|status| {
                let changed = status.position_ms != slot_status.position_ms
                    || status.duration_ms != slot_status.duration_ms
                    || status.is_playing != slot_status.is_playing;
                status.position_ms = slot_status.position_ms;
                status.duration_ms = slot_status.duration_ms;
                status.is_playing = slot_status.is_playing;
                changed
            });
        }
        Err(e) => {
            log::trace!(
                "Engine: Position poll failed for live slot {}: {}",
                state.slots.live_id(),
                e
            );
        }
    }
}
