//! Ramp volume writes that never hold up the engine loop.
//!
//! Each slot has one [`VolumeWriter`]. A tick only replaces the pending gain;
//! a single background task applies whatever is newest once the slot is free,
//! so a slow backend skips intermediate steps instead of delaying later ticks.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::state::SharedSlot;
use crate::audio::errors::SlotError;
use crate::audio::slot::PlaybackSlot;
use crate::audio::types::SlotId;

#[derive(Debug, Default)]
pub(crate) struct VolumeWriter {
    pending: Cell<Option<f32>>,
    writing: Cell<bool>,
    consecutive_failures: Cell<u32>,
    last_error: RefCell<Option<String>>,
}

impl VolumeWriter {
    /// Queues `volume` for the slot, replacing any gain not yet written.
    pub(crate) fn submit<S: PlaybackSlot + 'static>(
        self: &Rc<Self>,
        slot: SharedSlot<S>,
        slot_id: SlotId,
        volume: f32,
    ) {
        self.pending.set(Some(volume));
        if self.writing.replace(true) {
            return;
        }
        let writer = Rc::clone(self);
        tokio::task::spawn_local(async move {
            // Taking the gain and queueing on the slot lock happen in one poll,
            // so a `clear()` either drops the gain or lands after its write.
            while let Some(volume) = writer.pending.take() {
                let result = {
                    let mut guard = slot.lock().await;
                    guard.set_volume(volume).await
                };
                writer.record(slot_id, volume, result);
            }
            writer.writing.set(false);
        });
    }

    fn record(&self, slot_id: SlotId, volume: f32, result: Result<(), SlotError>) {
        match result {
            Ok(()) => {
                log::trace!("Engine: Slot {} volume -> {:.3}", slot_id, volume);
                self.consecutive_failures.set(0);
            }
            Err(e) => {
                let failures = self.consecutive_failures.get() + 1;
                log::warn!(
                    "Engine: Volume write {:.3} on slot {} failed ({} consecutive): {}",
                    volume,
                    slot_id,
                    failures,
                    e
                );
                self.consecutive_failures.set(failures);
                *self.last_error.borrow_mut() = Some(e.to_string());
            }
        }
    }

    /// Drops the unwritten gain and forgets earlier failures.
    pub(crate) fn clear(&self) {
        self.pending.set(None);
        self.consecutive_failures.set(0);
        self.last_error.borrow_mut().take();
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.get()
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::{LoadOptions, SlotStatus};
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tokio::task::LocalSet;

    #[derive(Default)]
    struct SlowSlot {
        writes: Vec<f32>,
        fail: bool,
    }

    impl PlaybackSlot for SlowSlot {
        async fn load(&mut self, _source: &str, _options: LoadOptions) -> Result<(), SlotError> {
            Ok(())
        }
        async fn play(&mut self) -> Result<(), SlotError> {
            Ok(())
        }
        async fn pause(&mut self) -> Result<(), SlotError> {
            Ok(())
        }
        async fn stop(&mut self) -> Result<(), SlotError> {
            Ok(())
        }
        async fn unload(&mut self) -> Result<(), SlotError> {
            Ok(())
        }
        async fn set_position(&mut self, _position_ms: u64) -> Result<(), SlotError> {
            Ok(())
        }
        async fn set_volume(&mut self, volume: f32) -> Result<(), SlotError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.fail {
                return Err(SlotError::Backend("volume rejected".to_string()));
            }
            self.writes.push(volume);
            Ok(())
        }
        async fn status(&mut self) -> Result<SlotStatus, SlotError> {
            Ok(SlotStatus::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_slot_only_receives_the_newest_gain() {
        LocalSet::new()
            .run_until(async {
                let slot = Rc::new(Mutex::new(SlowSlot::default()));
                let writer = Rc::new(VolumeWriter::default());
                writer.submit(slot.clone(), SlotId::B, 0.1);
                tokio::time::sleep(Duration::from_millis(10)).await;
                for step in 2..=5 {
                    writer.submit(slot.clone(), SlotId::B, step as f32 / 10.0);
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
                assert_eq!(slot.lock().await.writes, vec![0.1, 0.5]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_counted_until_cleared() {
        LocalSet::new()
            .run_until(async {
                let slot = Rc::new(Mutex::new(SlowSlot {
                    fail: true,
                    ..SlowSlot::default()
                }));
                let writer = Rc::new(VolumeWriter::default());
                for _ in 0..3 {
                    writer.submit(slot.clone(), SlotId::A, 0.5);
                    tokio::time::sleep(Duration::from_millis(150)).await;
                }
                assert_eq!(writer.consecutive_failures(), 3);
                assert_eq!(writer.last_error().as_deref(), Some("volume rejected"));

                writer.clear();
                assert_eq!(writer.consecutive_failures(), 0);
                assert_eq!(writer.last_error(), None);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_gain_is_never_written() {
        LocalSet::new()
            .run_until(async {
                let slot = Rc::new(Mutex::new(SlowSlot::default()));
                let writer = Rc::new(VolumeWriter::default());
                writer.submit(slot.clone(), SlotId::A, 0.3);
                writer.clear();
                tokio::time::sleep(Duration::from_millis(250)).await;
                assert!(slot.lock().await.writes.is_empty());
            })
            .await;
    }
}
