use super::*;
use crate::audio::playback::state::EngineParts;
use tokio::sync::{mpsc, oneshot};

use crate::audio::errors::EngineError;
use crate::audio::playback::commands::EngineCommand;

pub(crate) async fn engine_handle_init<S: PlaybackSlot + 'static>(
    state: &mut EngineState<S>,
) -> Result<(), EngineError> {
    let variant = state.current_variant.clone();
    let source = state.registry.resolve(&variant)?.to_string();
    let live_id = state.slots.live_id();
    let live = state.slots.live();
    let options = LoadOptions {
        position_ms: 0,
        volume: 1.0,
        looping: state.config.looping,
    };

    let slot_status = {
        let mut slot = live.lock().await;
        load_or_release(&mut *slot, live_id, &source, options).await?;
        if state.config.auto_start {
            if let Err(e) = slot.play().await {
                release_slot(&mut *slot, live_id).await;
                return Err(e.into());
            }
        }
        slot.status().await.unwrap_or_default()
    };

    state.is_playing = state.config.auto_start;
    state.ready = true;
    state.positions.track(&variant);
    state.positions.record(&variant, &slot_status);
    state.status.send_modify(|status| {
        status.position_ms = slot_status.position_ms;
        status.duration_ms = slot_status.duration_ms;
    });
    log::info!(
        "Engine: Ready with '{}' in slot {} (auto start: {})",
        variant,
        live_id,
        state.config.auto_start
    );
    emit_ready_event(&state.events, &variant);
    state.sync_status();
    Ok(())
}

pub(crate) fn engine_handle_init_failure<S>(state: &EngineState<S>, error: &EngineError) {
    let message = format!("Failed to load '{}': {}", state.current_variant, error);
    log::error!("Engine: Initialization failed: {}", message);
    state.status.send_modify(|status| {
        status.ready = false;
        status.init_error = Some(message.clone());
    });
    emit_error_event(&state.events, &message);
}

/// Keeps a failed engine answering shutdown requests until its handle goes away.
pub(crate) async fn drain_until_shutdown(mut receiver: mpsc::Receiver<EngineCommand>) {
    while let Some(command) = receiver.recv().await {
        match command {
            EngineCommand::Shutdown(shutdown_complete_tx) => {
                acknowledge_shutdown(shutdown_complete_tx);
                return;
            }
            other => {
                log::debug!("Engine: Ignoring {:?}, engine failed to initialize", other);
            }
        }
    }
}

pub(crate) async fn drain_parts_until_shutdown(parts: EngineParts) {
    drain_until_shutdown(parts.command_receiver).await;
}

pub(crate) fn acknowledge_shutdown(shutdown_complete_tx: oneshot::Sender<()>) {
    if shutdown_complete_tx.send(()).is_err() {
        log::error!("Engine: Failed to send shutdown completion signal.");
    }
}

pub(crate) async fn engine_handle_teardown<S: PlaybackSlot + 'static>(state: &mut EngineState<S>) {
    state.bump_generation();
    if let (Some(pending), Some(target)) = (state.phase.generation(), state.phase.target()) {
        log::info!("Engine: Abandoning transition to '{}' at teardown", target);
        emit_transition_abandoned_event(&state.events, pending, target);
    }
    state.phase = TransitionPhase::Idle;
    state.ready = false;
    state.is_playing = false;
    state.positions.release();
    state.slots.clear_volume_writes();

    for slot_id in [SlotId::A, SlotId::B] {
        let slot = state.slots.get(slot_id);
        let mut guard = slot.lock().await;
        release_slot(&mut *guard, slot_id).await;
    }
    log::info!("Engine: Both slots released.");
    emit_shutdown_event(&state.events);
    state.sync_status();
}
