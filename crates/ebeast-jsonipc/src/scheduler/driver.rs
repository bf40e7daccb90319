//! Frame loop.
//!
//! While the engine is active, frames run on a fixed interval. Every change of
//! engine activity resyncs SHM delivery; turning inactive runs exactly one
//! more frame so handlers can clean up. While inactive, adding a handler runs
//! a single frame so the new handler is called at least once.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::frame::FrameScheduler;
use crate::shm::ShmBroadcast;

pub struct FrameDriver {
    frames: Arc<FrameScheduler>,
    shm: Arc<ShmBroadcast>,
    engine_active: watch::Receiver<bool>,
    interval: Duration,
}

impl FrameDriver {
    pub fn new(
        frames: Arc<FrameScheduler>,
        shm: Arc<ShmBroadcast>,
        engine_active: watch::Receiver<bool>,
        interval: Duration,
    ) -> Self {
        Self {
            frames,
            shm,
            engine_active,
            interval,
        }
    }

    fn frame(&self, engine_active: bool) {
        self.frames
            .run_frame(engine_active && self.shm.is_snapshot_active());
    }

    /// Run until the engine activity sender is dropped.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut active = *self.engine_active.borrow_and_update();
        info!(active, interval_ms = self.interval.as_millis(), "Frame loop started");

        loop {
            if active {
                tokio::select! {
                    _ = ticker.tick() => self.frame(true),
                    changed = self.engine_active.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        active = self.reinstall();
                        ticker.reset();
                    }
                }
            } else {
                tokio::select! {
                    _ = self.frames.kicked() => {
                        if self.frames.take_added() {
                            self.frame(false);
                        }
                    }
                    changed = self.engine_active.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        active = self.reinstall();
                        ticker.reset();
                    }
                }
            }
        }
        debug!("Frame loop stopped");
    }

    fn reinstall(&mut self) -> bool {
        let active = *self.engine_active.borrow_and_update();
        debug!(active, "Engine activity changed");
        self.shm.reschedule();
        if !active {
            // the cleanup frame also serves handlers added while active
            self.frames.take_added();
            self.frame(false);
        }
        active
    }
}
