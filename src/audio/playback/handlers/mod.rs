pub mod init;
pub mod playback;

pub(crate) use init::*;
pub(crate) use playback::*;

use super::events::*;
use super::state::{EngineState, SharedSlot, TransitionPhase};
use crate::audio::errors::SlotError;
use crate::audio::slot::PlaybackSlot;
use crate::audio::types::{LoadOptions, SlotId};

/// Silences, stops and unloads a slot. Each step is best effort so an
/// already-empty slot is released without error.
pub(crate) async fn release_slot<S: PlaybackSlot>(slot: &mut S, slot_id: SlotId) {
    if let Err(e) = slot.set_volume(0.0).await {
        log::debug!("Engine: Silencing slot {} during release failed: {}", slot_id, e);
    }
    if let Err(e) = slot.stop().await {
        log::debug!("Engine: Stopping slot {} during release failed: {}", slot_id, e);
    }
    if let Err(e) = slot.unload().await {
        log::debug!("Engine: Unloading slot {} during release failed: {}", slot_id, e);
    }
}

/// Releases a slot from a task of its own so the caller does not wait on it.
pub(crate) fn spawn_release<S: PlaybackSlot + 'static>(slot: SharedSlot<S>, slot_id: SlotId) {
    tokio::task::spawn_local(async move {
        let mut guard = slot.lock().await;
        release_slot(&mut *guard, slot_id).await;
    });
}

/// Puts the live slot back to full volume after an interrupted ramp. The
/// write is queued behind any ramp write already in flight on that slot.
pub(crate) fn restore_live_volume<S: PlaybackSlot + 'static>(state: &EngineState<S>) {
    let live_id = state.slots.live_id();
    log::debug!("Engine: Restoring full volume on live slot {}", live_id);
    state.slots.submit_volume(live_id, 1.0);
}

/// Samples the live slot right away so the position cache reflects a
/// play or pause without waiting for the next poll.
pub(crate) async fn refresh_live_position<S: PlaybackSlot + 'static>(state: &mut EngineState<S>) {
    let live = state.slots.live();
    let status = {
        let mut slot = live.lock().await;
        slot.status().await
    };
    match status {
        Ok(slot_status) => state.positions.record(&state.current_variant, &slot_status),
        Err(e) => log::debug!("Engine: Live status read failed: {}", e),
    }
}

/// Loads a source into a slot, releasing it again if the load fails midway.
pub(crate) async fn load_or_release<S: PlaybackSlot>(
    slot: &mut S,
    slot_id: SlotId,
    source: &str,
    options: LoadOptions,
) -> Result<(), SlotError> {
    if let Err(e) = slot.load(source, options).await {
        log::error!("Engine: Loading '{}' into slot {} failed: {}", source, slot_id, e);
        if let Err(unload_err) = slot.unload().await {
            log::debug!("Engine: Unload after failed load on slot {} failed: {}", slot_id, unload_err);
        }
        return Err(e);
    }
    Ok(())
}

/// Whether the engine currently has a request in flight.
pub(crate) fn has_pending_transition<S>(state: &EngineState<S>) -> bool {
    !matches!(state.phase, TransitionPhase::Idle)
}
