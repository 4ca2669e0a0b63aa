//! The control-rate context: a dedicated thread running [`ControlLoop`]
//! cycles at a fixed interval.
//!
//! The thread owns the loop while it runs and hands it back on
//! [`Scheduler::stop`], so a stopped engine can keep stepping manually with
//! the same LFO phase and timing state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use polykey_voice::VoiceGraph;
use tracing::{debug, info};

use crate::control::ControlLoop;
use crate::effects::EffectsGraph;
use crate::error::EngineError;

/// Handle on a running control thread.
pub struct Scheduler<G, E>
where
    G: VoiceGraph + 'static,
    E: EffectsGraph + 'static,
{
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<ControlLoop<G, E>>>,
}

impl<G, E> Scheduler<G, E>
where
    G: VoiceGraph + 'static,
    E: EffectsGraph + 'static,
{
    /// Move `control` onto a new thread and start cycling.
    pub fn start(mut control: ControlLoop<G, E>) -> Result<Self, EngineError> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let interval = control.interval();

        let handle = thread::Builder::new()
            .name("polykey-control".to_string())
            .spawn(move || {
                control.reset_timing();
                let mut next = Instant::now();
                while thread_running.load(Ordering::Acquire) {
                    control.cycle();
                    next += interval;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        // Overran: drop the missed slots.
                        next = now;
                    }
                }
                control
            })
            .map_err(EngineError::Spawn)?;

        info!(interval_ms = interval.as_secs_f64() * 1000.0, "control scheduler started");
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Whether the thread is still cycling.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the thread and take the loop back.
    pub fn stop(mut self) -> Result<ControlLoop<G, E>, EngineError> {
        self.shutdown().ok_or(EngineError::SchedulerPanicked)
    }

    fn shutdown(&mut self) -> Option<ControlLoop<G, E>> {
        self.running.store(false, Ordering::Release);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(control) => {
                info!(cycles = control.cycles(), "control scheduler stopped");
                Some(control)
            }
            Err(_) => {
                debug!("control thread panicked during shutdown");
                None
            }
        }
    }
}

impl<G, E> Drop for Scheduler<G, E>
where
    G: VoiceGraph + 'static,
    E: EffectsGraph + 'static,
{
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.shutdown();
        }
    }
}

impl<G, E> std::fmt::Debug for Scheduler<G, E>
where
    G: VoiceGraph + 'static,
    E: EffectsGraph + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
