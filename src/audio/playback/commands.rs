use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::events::EngineEvent;
use super::state::EngineParts;
use crate::audio::config::{COMMAND_CHANNEL_CAPACITY, EVENT_CHANNEL_CAPACITY, EngineConfig};
use crate::audio::errors::{EngineError, SlotError};
use crate::audio::registry::TrackRegistry;
use crate::audio::slot::PlaybackSlot;
use crate::audio::types::{PlayerStatus, Variant};

// --- Engine Commands ---
#[derive(Debug)]
pub enum EngineCommand {
    SetVariant(Variant),
    Play,
    Pause,
    Shutdown(oneshot::Sender<()>),
}

// --- Control Surface ---

/// Handle to a running crossfade engine.
///
/// Cloning is cheap; every clone talks to the same engine. Reads come from a
/// status snapshot the engine publishes, so they never wait on the engine.
#[derive(Clone)]
pub struct CrossfadePlayer {
    command_sender: mpsc::Sender<EngineCommand>,
    status: watch::Receiver<PlayerStatus>,
    events: broadcast::Sender<EngineEvent>,
    registry: Arc<TrackRegistry>,
}

impl CrossfadePlayer {
    fn build(config: EngineConfig) -> Result<(Self, EngineParts), EngineError> {
        config.validate()?;
        let registry = Arc::new(TrackRegistry::new(config.sources.clone()));
        let (command_sender, command_receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (status_sender, status_receiver) =
            watch::channel(PlayerStatus::initial(config.initial_variant.clone()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let player = CrossfadePlayer {
            command_sender,
            status: status_receiver,
            events: events.clone(),
            registry: registry.clone(),
        };
        let parts = EngineParts {
            config: Arc::new(config),
            registry,
            command_receiver,
            status: status_sender,
            events,
        };
        Ok((player, parts))
    }

    /// Starts the engine on the current `LocalSet` with the given slots.
    ///
    /// Must be called from within [`tokio::task::LocalSet`]; initialization
    /// continues in the background, see [`wait_ready`](Self::wait_ready).
    pub fn spawn_local<S: PlaybackSlot + 'static>(
        config: EngineConfig,
        slot_a: S,
        slot_b: S,
    ) -> Result<Self, EngineError> {
        let (player, parts) = Self::build(config)?;
        log::info!("Engine: Spawning on local task set.");
        tokio::task::spawn_local(super::run_engine(parts, slot_a, slot_b));
        Ok(player)
    }

    /// Starts the engine on a dedicated thread. `make_slots` runs on that
    /// thread, so the slots never have to cross threads.
    pub fn spawn_thread<S, F>(
        config: EngineConfig,
        make_slots: F,
    ) -> Result<(Self, JoinHandle<()>), EngineError>
    where
        S: PlaybackSlot + 'static,
        F: FnOnce() -> Result<(S, S), SlotError> + Send + 'static,
    {
        let (player, parts) = Self::build(config)?;
        let handle = std::thread::Builder::new()
            .name("crossfade-engine".to_string())
            .spawn(move || super::run_engine_thread(parts, make_slots))
            .map_err(|e| EngineError::Initialization(format!("Failed to spawn engine thread: {}", e)))?;
        Ok((player, handle))
    }

    // --- Reads ---

    pub fn current_variant(&self) -> Variant {
        self.status.borrow().current_variant.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.status.borrow().ready
    }

    pub fn status(&self) -> PlayerStatus {
        self.status.borrow().clone()
    }

    pub fn variants(&self) -> Vec<Variant> {
        self.registry.variants()
    }

    /// Status updates, for UI bindings that redraw on change.
    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.status.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    // --- Writes ---

    /// Requests a crossfade to `variant`. Returns once the request is queued.
    ///
    /// Unknown variants are rejected. Before the engine is ready the call is a
    /// silent no-op.
    pub fn set_variant(&self, variant: impl Into<Variant>) -> Result<(), EngineError> {
        let variant = variant.into();
        self.registry.resolve(&variant)?;
        if !self.is_ready() {
            log::debug!("CMD: SetVariant '{}' dropped, engine not ready.", variant);
            return Ok(());
        }
        log::info!("CMD: SetVariant '{}'", variant);
        self.send(EngineCommand::SetVariant(variant))
    }

    pub fn play(&self) -> Result<(), EngineError> {
        log::info!("CMD: Play");
        self.send(EngineCommand::Play)
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        log::info!("CMD: Pause");
        self.send(EngineCommand::Pause)
    }

    fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.command_sender.try_send(command).map_err(|e| match e {
            TrySendError::Full(command) => {
                log::warn!("CMD: Command queue full, dropping {:?}", command);
                EngineError::CommandQueueFull
            }
            TrySendError::Closed(_) => EngineError::EngineStopped,
        })
    }

    /// Resolves once the initial variant is loaded, or with the init error.
    pub async fn wait_ready(&self) -> Result<(), EngineError> {
        let mut status = self.status.clone();
        loop {
            {
                let snapshot = status.borrow_and_update();
                if snapshot.ready {
                    return Ok(());
                }
                if let Some(error) = &snapshot.init_error {
                    return Err(EngineError::Initialization(error.clone()));
                }
            }
            if status.changed().await.is_err() {
                return Err(EngineError::EngineStopped);
            }
        }
    }

    /// Stops any transition, releases both slots and ends the engine task.
    /// Calling it again after the engine is gone is a no-op.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        if self
            .command_sender
            .send(EngineCommand::Shutdown(shutdown_tx))
            .await
            .is_err()
        {
            log::debug!("CMD: Shutdown requested, engine already stopped.");
            return Ok(());
        }
        log::info!("CMD: Waiting for engine shutdown confirmation...");
        shutdown_rx
            .await
            .map_err(|e| EngineError::ShutdownSignalError(e.to_string()))?;
        log::info!("CMD: Engine shutdown confirmed.");
        Ok(())
    }
}
