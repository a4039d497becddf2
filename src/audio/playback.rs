use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::audio::errors::SlotError;
use crate::audio::slot::PlaybackSlot;

pub mod commands;
pub use commands::{CrossfadePlayer, EngineCommand};
pub mod events;
pub use events::EngineEvent;
mod handlers;
mod position;
mod state;
mod transition;
mod volume;

use state::{EngineParts, EngineState, PrepareOutcome};

// --- Engine Task ---

/// Drives one engine until shutdown. Must run inside a `LocalSet`.
pub(crate) async fn run_engine<S: PlaybackSlot + 'static>(parts: EngineParts, slot_a: S, slot_b: S) {
    log::info!("Engine: Starting...");
    let EngineParts {
        config,
        registry,
        command_receiver,
        status,
        events,
    } = parts;
    let (mut state, prepared_receiver) =
        EngineState::new(config, registry, status, events, slot_a, slot_b);

    if let Err(e) = handlers::engine_handle_init(&mut state).await {
        handlers::engine_handle_init_failure(&state, &e);
        handlers::drain_until_shutdown(command_receiver).await;
        log::info!("Engine: Stopped after failed initialization.");
        return;
    }

    run_engine_loop(&mut state, command_receiver, prepared_receiver).await;
    log::info!("Engine: Stopped.");
}

async fn run_engine_loop<S: PlaybackSlot + 'static>(
    state: &mut EngineState<S>,
    mut receiver: mpsc::Receiver<EngineCommand>,
    mut prepared_receiver: mpsc::UnboundedReceiver<PrepareOutcome>,
) {
    log::info!("Engine: Entering main loop.");
    let mut should_shutdown = false;
    let mut ramp_interval = tokio::time::interval(state.config.tick_interval());
    ramp_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut position_interval = tokio::time::interval(state.config.position_poll_interval());
    position_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !should_shutdown {
        tokio::select! {
            maybe_command = receiver.recv() => {
                match maybe_command {
                    Some(command) => {
                        log::debug!("Engine Received: {:?}", command);
                        match command {
                            EngineCommand::SetVariant(variant) => {
                                transition::engine_handle_set_variant(variant, state).await;
                            }
                            EngineCommand::Play => {
                                handlers::engine_handle_play(state).await;
                            }
                            EngineCommand::Pause => {
                                handlers::engine_handle_pause(state).await;
                            }
                            EngineCommand::Shutdown(shutdown_complete_tx) => {
                                log::info!("Engine: Shutdown received. Releasing slots.");
                                handlers::engine_handle_teardown(state).await;
                                should_shutdown = true;
                                handlers::acknowledge_shutdown(shutdown_complete_tx);
                            }
                        }
                    }
                    None => {
                        log::info!("Engine: Command channel closed. Exiting loop.");
                        handlers::engine_handle_teardown(state).await;
                        should_shutdown = true;
                    }
                }
            }
            Some(outcome) = prepared_receiver.recv() => {
                if transition::engine_handle_prepare_outcome(outcome, state).await {
                    // First volume write lands on the next tick, not immediately.
                    ramp_interval.reset();
                }
            }
            _ = ramp_interval.tick(), if state.is_ramping() => {
                transition::process_ramp_tick(state).await;
            }
            _ = position_interval.tick() => {
                position::process_position_poll(state).await;
            }
        }
    }
    log::info!("Engine: Main loop finished.");
}

// --- Engine Thread ---

/// Runs an engine on the calling thread with its own current-thread runtime.
pub(crate) fn run_engine_thread<S, F>(parts: EngineParts, make_slots: F)
where
    S: PlaybackSlot + 'static,
    F: FnOnce() -> Result<(S, S), SlotError>,
{
    log::info!("Engine Thread: Building Tokio current_thread runtime...");
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            parts.fail_initialization(&format!("Failed to build Tokio runtime: {}", e));
            return;
        }
    };
    let local = tokio::task::LocalSet::new();

    match make_slots() {
        Ok((slot_a, slot_b)) => {
            local.block_on(&rt, run_engine(parts, slot_a, slot_b));
        }
        Err(e) => {
            parts.fail_initialization(&format!("Failed to create playback slots: {}", e));
            local.block_on(&rt, handlers::drain_parts_until_shutdown(parts));
        }
    }
    log::info!("Engine Thread: Stopped.");
}
