use serde::Serialize;
use tokio::sync::broadcast;

use crate::audio::types::{SlotId, Variant};

// --- Event Payloads for the UI layer ---
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    Ready {
        variant: Variant,
    },
    TransitionStarted {
        generation: u64,
        from: Variant,
        to: Variant,
        position_ms: u64,
    },
    TransitionCompleted {
        generation: u64,
        variant: Variant,
        live_slot: SlotId,
    },
    TransitionAbandoned {
        generation: u64,
        variant: Variant,
    },
    TransitionFailed {
        generation: u64,
        variant: Variant,
        error: String,
    },
    Error {
        message: String,
    },
    ShutDown,
}

// --- Event Emitter Helpers ---

fn emit(events: &broadcast::Sender<EngineEvent>, event: EngineEvent) {
    // No subscribers is the normal case for headless use.
    if let Err(e) = events.send(event) {
        log::trace!("Engine: No event subscribers for {:?}", e.0);
    }
}

pub(crate) fn emit_ready_event(events: &broadcast::Sender<EngineEvent>, variant: &Variant) {
    emit(
        events,
        EngineEvent::Ready {
            variant: variant.clone(),
        },
    );
}

pub(crate) fn emit_transition_started_event(
    events: &broadcast::Sender<EngineEvent>,
    generation: u64,
    from: &Variant,
    to: &Variant,
    position_ms: u64,
) {
    emit(
        events,
        EngineEvent::TransitionStarted {
            generation,
            from: from.clone(),
            to: to.clone(),
            position_ms,
        },
    );
}

pub(crate) fn emit_transition_completed_event(
    events: &broadcast::Sender<EngineEvent>,
    generation: u64,
    variant: &Variant,
    live_slot: SlotId,
) {
    emit(
        events,
        EngineEvent::TransitionCompleted {
            generation,
            variant: variant.clone(),
            live_slot,
        },
    );
}

pub(crate) fn emit_transition_abandoned_event(
    events: &broadcast::Sender<EngineEvent>,
    generation: u64,
    variant: &Variant,
) {
    emit(
        events,
        EngineEvent::TransitionAbandoned {
            generation,
            variant: variant.clone(),
        },
    );
}

pub(crate) fn emit_transition_failed_event(
    events: &broadcast::Sender<EngineEvent>,
    generation: u64,
    variant: &Variant,
    error_message: &str,
) {
    emit(
        events,
        EngineEvent::TransitionFailed {
            generation,
            variant: variant.clone(),
            error: error_message.to_string(),
        },
    );
}

pub(crate) fn emit_error_event(events: &broadcast::Sender<EngineEvent>, error_message: &str) {
    emit(
        events,
        EngineEvent::Error {
            message: error_message.to_string(),
        },
    );
}

pub(crate) fn emit_shutdown_event(events: &broadcast::Sender<EngineEvent>) {
    emit(events, EngineEvent::ShutDown);
}
