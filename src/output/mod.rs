//! Output devices: where quantized universes go after each tick.
//!
//! Devices are shared as `Arc<dyn OutputDevice>` and every method takes
//! `&self`, so `abort` can be called from a controlling thread while the tick
//! thread is blocked in `wait_for_next_sync`.

pub mod artnet;
pub mod dummy;

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::models::universe::UniverseValues;
use crate::settings::{EngineSettings, OutputKind};

pub use artnet::{ArtNetConfig, ArtNetDevice};
pub use dummy::DummyDevice;

pub trait OutputDevice: Send + Sync {
    fn name(&self) -> &str;

    fn universe_count(&self) -> usize;

    fn open(&self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Gets the device ready again after an over/underrun.
    fn prepare(&self) -> Result<()>;

    fn set_values(&self, universe: usize, values: &UniverseValues) -> Result<()>;

    /// Last values handed to `universe`.
    fn get_values(&self, universe: usize) -> Option<UniverseValues>;

    /// Blocks until the device wants the next frame. Returns early after `abort`.
    fn wait_for_next_sync(&self) -> Result<()>;

    fn abort(&self);
}

#[derive(Debug, Default)]
struct PacerState {
    next: Option<Instant>,
    aborted: bool,
}

/// Fixed-period frame clock with an interruptible wait.
#[derive(Debug)]
pub struct Pacer {
    period: Duration,
    state: Mutex<PacerState>,
    wake: Condvar,
}

impl Pacer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            state: Mutex::new(PacerState::default()),
            wake: Condvar::new(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sleeps until the next frame boundary. Returns `false` when the caller
    /// was already more than a full period late, in which case the clock is
    /// restarted from now.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock().expect("pacer poisoned");
        let now = Instant::now();
        let mut on_time = true;
        let deadline = match state.next {
            Some(next) if next + self.period < now => {
                on_time = false;
                now
            }
            Some(next) => next,
            None => now,
        };

        while !state.aborted {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .wake
                .wait_timeout(state, deadline - now)
                .expect("pacer poisoned");
            state = guard;
        }

        if state.aborted {
            state.aborted = false;
            state.next = None;
            return true;
        }
        state.next = Some(deadline + self.period);
        on_time
    }

    /// Wakes the current or next `wait`.
    pub fn abort(&self) {
        let mut state = self.state.lock().expect("pacer poisoned");
        state.aborted = true;
        self.wake.notify_all();
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().expect("pacer poisoned");
        state.next = None;
    }
}

/// Builds the devices named by the settings. Nothing is opened yet.
pub fn devices_from_settings(settings: &EngineSettings) -> Vec<Arc<dyn OutputDevice>> {
    let period = settings.tick_period();
    match settings.output {
        OutputKind::Dummy => vec![Arc::new(DummyDevice::new(
            "dummy",
            settings.universe_count,
            period,
        ))],
        OutputKind::Artnet => vec![Arc::new(ArtNetDevice::new(
            "artnet",
            ArtNetConfig::from_settings(settings),
            period,
        ))],
        OutputKind::None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn pacer_spaces_frames_by_its_period() {
        let pacer = Pacer::new(Duration::from_millis(20));
        let start = Instant::now();
        assert!(pacer.wait());
        assert!(pacer.wait());
        assert!(pacer.wait());
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn abort_wakes_a_blocked_wait() {
        let pacer = Arc::new(Pacer::new(Duration::from_secs(60)));
        pacer.wait();

        let waiter = {
            let pacer = pacer.clone();
            thread::spawn(move || {
                let start = Instant::now();
                pacer.wait();
                start.elapsed()
            })
        };
        thread::sleep(Duration::from_millis(20));
        pacer.abort();

        let waited = waiter.join().expect("waiter finished");
        assert!(waited < Duration::from_secs(10));
    }

    #[test]
    fn late_caller_is_reported() {
        let pacer = Pacer::new(Duration::from_millis(5));
        pacer.wait();
        thread::sleep(Duration::from_millis(30));
        assert!(!pacer.wait());
    }
}
