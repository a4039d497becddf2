use super::*;
use crate::audio::playback::transition::cancel_pending_transition;

pub(crate) async fn engine_handle_play<S: PlaybackSlot + 'static>(state: &mut EngineState<S>) {
    if !state.ready {
        log::debug!("Engine: Play ignored, engine not ready.");
        return;
    }
    if state.is_playing {
        log::debug!("Engine: Play ignored, already playing.");
        return;
    }
    let live_id = state.slots.live_id();
    let live = state.slots.live();
    let result = {
        let mut slot = live.lock().await;
        slot.play().await
    };
    refresh_live_position(state).await;
    match result {
        Ok(()) => {
            state.is_playing = true;
            log::info!("Engine: Playing '{}' in slot {}", state.current_variant, live_id);
        }
        Err(e) => {
            log::error!("Engine: Play failed on slot {}: {}", live_id, e);
            emit_error_event(&state.events, &format!("Cannot play: {}", e));
        }
    }
    state.sync_status();
}

pub(crate) async fn engine_handle_pause<S: PlaybackSlot + 'static>(state: &mut EngineState<S>) {
    if !state.ready {
        log::debug!("Engine: Pause ignored, engine not ready.");
        return;
    }
    // A paused engine has nothing to crossfade against.
    if has_pending_transition(state) {
        cancel_pending_transition(state).await;
    }
    let live_id = state.slots.live_id();
    let live = state.slots.live();
    let result = {
        let mut slot = live.lock().await;
        slot.pause().await
    };
    refresh_live_position(state).await;
    match result {
        Ok(()) => {
            state.is_playing = false;
            log::info!("Engine: Paused '{}' in slot {}", state.current_variant, live_id);
        }
        Err(e) => {
            log::error!("Engine: Pause failed on slot {}: {}", live_id, e);
            emit_error_event(&state.events, &format!("Cannot pause: {}", e));
        }
    }
    state.sync_status();
}
