//! Transition scheduling: standby preparation, the volume ramp, and completion.
//!
//! Every request bumps the engine generation. Preparation tasks compare the
//! generation they were started with against the shared counter between slot
//! operations and stop as soon as they are stale; the ramp lives in
//! [`TransitionPhase::Ramping`] and is simply replaced by a newer request.

use std::cell::Cell;
use std::rc::Rc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::events::*;
use super::handlers::{
    has_pending_transition, load_or_release, release_slot, restore_live_volume, spawn_release,
};
use super::state::{
    EngineState, PrepareOutcome, PrepareRequest, PrepareStatus, SharedSlot, TransitionPhase,
    TransitionState,
};
use crate::audio::errors::SlotError;
use crate::audio::fade::ramp_progress;
use crate::audio::slot::PlaybackSlot;
use crate::audio::types::{LoadOptions, SlotId, Variant};

// --- Requests ---

pub(crate) async fn engine_handle_set_variant<S: PlaybackSlot + 'static>(
    variant: Variant,
    state: &mut EngineState<S>,
) {
    if !state.ready {
        log::debug!("Engine: SetVariant '{}' ignored, engine not ready.", variant);
        return;
    }
    if state.phase.target() == Some(&variant) {
        log::debug!("Engine: '{}' is already being transitioned to.", variant);
        return;
    }
    if variant == state.current_variant {
        if has_pending_transition(state) {
            log::info!("Engine: Reverting to '{}', cancelling pending transition.", variant);
            cancel_pending_transition(state).await;
            state.sync_status();
        } else {
            log::debug!("Engine: '{}' is already playing.", variant);
        }
        return;
    }

    let source = match state.registry.resolve(&variant) {
        Ok(source) => source.to_string(),
        Err(e) => {
            log::error!("Engine: {}", e);
            emit_error_event(&state.events, &e.to_string());
            return;
        }
    };

    if has_pending_transition(state) {
        abandon_pending_transition(state).await;
    }

    let outgoing = state.current_variant.clone();
    state.positions.release();
    let position_ms = state
        .positions
        .seek_target(&variant, &outgoing, state.is_playing);
    let generation = state.bump_generation();
    let slot_id = state.slots.standby_id();
    let request = PrepareRequest {
        generation,
        target: variant.clone(),
        slot_id,
        source,
        options: LoadOptions {
            position_ms,
            volume: 0.0,
            looping: state.config.looping,
        },
        start_playing: state.is_playing,
    };

    log::info!(
        "Engine: Transition {} '{}' -> '{}' in slot {} from {}ms",
        generation,
        outgoing,
        variant,
        slot_id,
        position_ms
    );
    state.phase = TransitionPhase::Preparing {
        generation,
        target: variant.clone(),
    };
    emit_transition_started_event(&state.events, generation, &outgoing, &variant, position_ms);
    state.sync_status();

    tokio::task::spawn_local(prepare_standby(
        state.slots.get(slot_id),
        state.generation.clone(),
        request,
        state.prepared_sender.clone(),
    ));
}

/// Drops the pending transition. The standby slot is left for whoever runs
/// next on it to clear.
async fn abandon_pending_transition<S: PlaybackSlot + 'static>(state: &mut EngineState<S>) {
    let was_ramping = state.is_ramping();
    let previous = std::mem::take(&mut state.phase);
    if let (Some(generation), Some(target)) = (previous.generation(), previous.target()) {
        log::info!("Engine: Transition {} to '{}' superseded.", generation, target);
        emit_transition_abandoned_event(&state.events, generation, target);
    }
    if was_ramping {
        state.slots.clear_volume_writes();
        restore_live_volume(state);
    }
    // The live slot kept playing while the request was pending.
    let current = state.current_variant.clone();
    state.positions.reclaim(&current);
}

/// Drops the pending transition and returns the engine to the current variant.
pub(crate) async fn cancel_pending_transition<S: PlaybackSlot + 'static>(
    state: &mut EngineState<S>,
) {
    if !has_pending_transition(state) {
        return;
    }
    state.bump_generation();
    abandon_pending_transition(state).await;
    let standby = state.slots.standby_id();
    spawn_release(state.slots.get(standby), standby);
}

// --- Standby Preparation ---

pub(crate) async fn prepare_standby<S: PlaybackSlot>(
    slot: SharedSlot<S>,
    generation: Rc<Cell<u64>>,
    request: PrepareRequest,
    outcome_sender: mpsc::UnboundedSender<PrepareOutcome>,
) {
    let result = run_preparation(&slot, &generation, &request).await;
    let outcome = PrepareOutcome {
        generation: request.generation,
        target: request.target,
        slot_id: request.slot_id,
        result,
    };
    if outcome_sender.send(outcome).is_err() {
        log::debug!("Engine: Preparation outcome dropped, engine loop has exited.");
    }
}

async fn run_preparation<S: PlaybackSlot>(
    slot: &SharedSlot<S>,
    generation: &Cell<u64>,
    request: &PrepareRequest,
) -> Result<PrepareStatus, SlotError> {
    let is_stale = || generation.get() != request.generation;
    let slot_id = request.slot_id;

    let mut guard = slot.lock().await;
    if is_stale() {
        return Ok(PrepareStatus::Superseded);
    }
    // Whatever an abandoned transition left here must be silent before reuse.
    release_slot(&mut *guard, slot_id).await;
    if is_stale() {
        return Ok(PrepareStatus::Superseded);
    }

    load_or_release(&mut *guard, slot_id, &request.source, request.options).await?;
    if is_stale() {
        return Ok(PrepareStatus::Superseded);
    }

    if request.start_playing {
        start_prepared(&mut *guard, slot_id, request.options.position_ms).await?;
        if is_stale() {
            if let Err(e) = guard.stop().await {
                log::debug!("Engine: Stopping superseded slot {} failed: {}", slot_id, e);
            }
            return Ok(PrepareStatus::Superseded);
        }
    }
    log::debug!("Engine: Slot {} prepared for generation {}", slot_id, request.generation);
    Ok(PrepareStatus::Ready {
        playing: request.start_playing,
    })
}

/// Starts a loaded slot and seeks it again, since some backends drift
/// between the load-time seek and the first rendered frame.
async fn start_prepared<S: PlaybackSlot>(
    slot: &mut S,
    slot_id: SlotId,
    position_ms: u64,
) -> Result<(), SlotError> {
    if let Err(e) = slot.play().await {
        log::error!("Engine: Starting slot {} failed: {}", slot_id, e);
        release_slot(slot, slot_id).await;
        return Err(e);
    }
    if let Err(e) = slot.set_position(position_ms).await {
        log::warn!("Engine: Post-start seek on slot {} failed: {}", slot_id, e);
    }
    Ok(())
}

/// Applies a finished preparation. Returns `true` when a ramp was started.
pub(crate) async fn engine_handle_prepare_outcome<S: PlaybackSlot + 'static>(
    outcome: PrepareOutcome,
    state: &mut EngineState<S>,
) -> bool {
    if outcome.generation != state.generation.get() {
        log::debug!(
            "Engine: Ignoring stale preparation of '{}' (generation {}, now {})",
            outcome.target,
            outcome.generation,
            state.generation.get()
        );
        return false;
    }

    let playing = match outcome.result {
        Ok(PrepareStatus::Ready { playing }) => playing,
        Ok(PrepareStatus::Superseded) => return false,
        Err(e) => {
            fail_transition(state, outcome.generation, &outcome.target, &e.to_string());
            return false;
        }
    };

    if state.is_playing && !playing {
        // Playback resumed while the standby was being prepared paused, so
        // the live slot has moved on since the load-time seek.
        let position_ms = late_start_position(state, &outcome.target).await;
        let slot = state.slots.get(outcome.slot_id);
        let result = {
            let mut guard = slot.lock().await;
            start_prepared(&mut *guard, outcome.slot_id, position_ms).await
        };
        if let Err(e) = result {
            fail_transition(state, outcome.generation, &outcome.target, &e.to_string());
            return false;
        }
    }

    // The outgoing slot starts the ramp from full volume.
    state.slots.clear_volume_writes();
    restore_live_volume(state);
    let transition = TransitionState {
        generation: outcome.generation,
        target: outcome.target,
        from: state.slots.live_id(),
        to: outcome.slot_id,
        started_at: Instant::now(),
        duration: state.config.fade_duration(),
        failure_limit: state.config.ramp_failure_limit(),
    };

    if !state.is_playing {
        log::debug!("Engine: Paused, swapping to '{}' without a ramp.", transition.target);
        complete_transition(state, transition).await;
        return false;
    }

    log::info!(
        "Engine: Ramping {} -> {} over {}ms ({:?})",
        transition.from,
        transition.to,
        transition.duration.as_millis(),
        state.config.fade_curve
    );
    state.phase = TransitionPhase::Ramping(transition);
    state.sync_status();
    true
}

/// Where a standby prepared while paused should start once playback resumed.
async fn late_start_position<S: PlaybackSlot + 'static>(
    state: &EngineState<S>,
    target: &Variant,
) -> u64 {
    let live = state.slots.live();
    let live_status = {
        let mut guard = live.lock().await;
        guard.status().await
    };
    match live_status {
        Ok(status) => state
            .positions
            .late_start_target(target, &state.current_variant, status.position_ms),
        Err(e) => {
            log::debug!("Engine: Live status read for late start failed: {}", e);
            state.positions.estimate(target)
        }
    }
}

fn fail_transition<S: PlaybackSlot + 'static>(
    state: &mut EngineState<S>,
    generation: u64,
    target: &Variant,
    error_message: &str,
) {
    log::error!(
        "Engine: Transition {} to '{}' failed: {}. Staying on '{}'.",
        generation,
        target,
        error_message,
        state.current_variant
    );
    state.phase = TransitionPhase::Idle;
    let current = state.current_variant.clone();
    state.positions.reclaim(&current);
    emit_transition_failed_event(&state.events, generation, target, error_message);
    state.sync_status();
}

// --- Ramp ---

/// Hands this tick's gains to the slot writers; nothing here waits on a slot.
pub(crate) async fn process_ramp_tick<S: PlaybackSlot + 'static>(state: &mut EngineState<S>) {
    let (generation, from, to, started_at, duration, failure_limit) = match &state.phase {
        TransitionPhase::Ramping(t) => (
            t.generation,
            t.from,
            t.to,
            t.started_at,
            t.duration,
            t.failure_limit,
        ),
        _ => return,
    };
    if generation != state.generation.get() {
        log::debug!("Engine: Dropping ramp for stale generation {}", generation);
        state.phase = TransitionPhase::Idle;
        return;
    }

    let failures = state
        .slots
        .writer(to)
        .consecutive_failures()
        .max(state.slots.writer(from).consecutive_failures());
    if failures >= failure_limit {
        let error_message = state
            .slots
            .writer(to)
            .last_error()
            .or_else(|| state.slots.writer(from).last_error())
            .unwrap_or_else(|| "volume writes failing".to_string());
        log::error!(
            "Engine: {} consecutive volume writes failed, aborting ramp {}",
            failures,
            generation
        );
        abort_ramp(state, &error_message);
        return;
    }

    let k = ramp_progress(started_at.elapsed(), duration);
    if k >= 1.0 {
        if let TransitionPhase::Ramping(transition) = std::mem::take(&mut state.phase) {
            complete_transition(state, transition).await;
        }
        return;
    }

    let (incoming_gain, outgoing_gain) = state.config.fade_curve.gains(k);
    log::trace!(
        "Engine: Ramp {} k={:.3} in={:.3} out={:.3}",
        generation,
        k,
        incoming_gain,
        outgoing_gain
    );
    state.slots.submit_volume(to, incoming_gain);
    state.slots.submit_volume(from, outgoing_gain);
}

fn abort_ramp<S: PlaybackSlot + 'static>(state: &mut EngineState<S>, error_message: &str) {
    let TransitionPhase::Ramping(transition) = std::mem::take(&mut state.phase) else {
        return;
    };
    abandon_swap(state, transition, error_message);
}

/// Keeps the outgoing variant live after a transition that cannot be made
/// audible, and reports it failed.
fn abandon_swap<S: PlaybackSlot + 'static>(
    state: &mut EngineState<S>,
    transition: TransitionState,
    error_message: &str,
) {
    state.bump_generation();
    state.slots.clear_volume_writes();
    restore_live_volume(state);
    spawn_release(state.slots.get(transition.to), transition.to);
    fail_transition(state, transition.generation, &transition.target, error_message);
}

/// Pins the incoming slot to full volume, then makes it live and retires the
/// outgoing slot. An incoming slot that cannot be raised fails the transition.
async fn complete_transition<S: PlaybackSlot + 'static>(
    state: &mut EngineState<S>,
    transition: TransitionState,
) {
    state.slots.clear_volume_writes();
    let pinned = {
        let slot = state.slots.get(transition.to);
        let mut guard = slot.lock().await;
        guard.set_volume(1.0).await
    };
    if let Err(e) = pinned {
        log::error!(
            "Engine: Slot {} could not be raised to full volume: {}",
            transition.to,
            e
        );
        abandon_swap(state, transition, &e.to_string());
        return;
    }
    spawn_release(state.slots.get(transition.from), transition.from);

    state.slots.set_live(transition.to);
    state.current_variant = transition.target.clone();
    state.phase = TransitionPhase::Idle;

    let live_status = {
        let slot = state.slots.live();
        let mut guard = slot.lock().await;
        guard.status().await
    };
    state.positions.track(&transition.target);
    match live_status {
        Ok(slot_status) => state.positions.record(&transition.target, &slot_status),
        Err(e) => log::debug!("Engine: Status read after swap failed: {}", e),
    }

    log::info!(
        "Engine: Transition {} complete, '{}' live in slot {}",
        transition.generation,
        transition.target,
        transition.to
    );
    emit_transition_completed_event(
        &state.events,
        transition.generation,
        &transition.target,
        transition.to,
    );
    state.sync_status();
}
