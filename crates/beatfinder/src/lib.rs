//! Live beat detection.
//!
//! A [`BeatFinder`] captures audio on its own thread, runs onset detection on
//! every period and publishes a beat counter, a confidence and a coarse audio
//! level. Consumers read those values without locking.

mod capture;
pub mod detector;
pub mod tracker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub use detector::{coarse_level, downmix, Detection, OnsetDetector, SpectralFluxDetector};
pub use tracker::{BeatState, BeatTracker, BEAT_WRAP, MIN_CONFIDENCE};

/// How long the capture thread waits for a period before re-checking the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const PERIOD_QUEUE: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatFinderConfig {
    /// Input device name; `None` selects the host default.
    pub device_name: Option<String>,
    /// Frames per analysis period (also the FFT size).
    pub block_size: usize,
    /// RMS level in dBFS below which a period counts as silence.
    pub silence_db: f32,
}

impl Default for BeatFinderConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            block_size: 1024,
            silence_db: -60.0,
        }
    }
}

/// Audio capture thread plus the published beat values.
pub struct BeatFinder {
    config: BeatFinderConfig,
    state: Arc<BeatState>,
    stopping: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BeatFinder {
    pub fn new(config: BeatFinderConfig) -> Self {
        Self {
            config,
            state: Arc::new(BeatState::new()),
            stopping: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BeatFinderConfig {
        &self.config
    }

    /// Shared view of the published values.
    pub fn state(&self) -> Arc<BeatState> {
        self.state.clone()
    }

    /// Returns `(beat value, confidence)`. Never blocks.
    pub fn get_beat_value(&self) -> (f64, f64) {
        (self.state.beat_value(), self.state.confidence())
    }

    /// Peak level of the most recent period. Never blocks.
    pub fn get_audio_level(&self) -> u16 {
        self.state.audio_level()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Spawns the capture thread. Calling `start` on a running finder does nothing.
    ///
    /// A capture device that fails to open is logged from the thread; the
    /// published confidence then simply stays at zero.
    pub fn start(&self) {
        let mut handle = match self.handle.lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!("[beatfinder] handle lock poisoned; not starting");
                return;
            }
        };
        if handle.is_some() {
            return;
        }

        self.stopping.store(false, Ordering::SeqCst);
        let config = self.config.clone();
        let state = self.state.clone();
        let stopping = self.stopping.clone();

        let spawned = thread::Builder::new()
            .name("beatfinder".into())
            .spawn(move || run_capture(config, state, stopping));

        match spawned {
            Ok(join) => *handle = Some(join),
            Err(e) => log::error!("[beatfinder] failed to spawn capture thread: {}", e),
        }
    }

    /// Signals the capture thread and waits for it to finish.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let join = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(join) = join {
            if join.join().is_err() {
                log::error!("[beatfinder] capture thread panicked");
            }
        }
    }
}

impl Drop for BeatFinder {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for BeatFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeatFinder")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

/// Analyses one captured period: downmix, publish the level, detect, track.
pub fn process_period(
    detector: &mut dyn OnsetDetector,
    tracker: &mut BeatTracker,
    interleaved: &[f32],
    channels: usize,
    now: f64,
) -> Detection {
    let mono = downmix(interleaved, channels);
    tracker.state().publish_audio_level(coarse_level(&mono));
    let detection = detector.process(&mono);
    tracker.update(&detection, now);
    detection
}

fn run_capture(config: BeatFinderConfig, state: Arc<BeatState>, stopping: Arc<AtomicBool>) {
    let (tx, rx) = mpsc::sync_channel::<Vec<f32>>(PERIOD_QUEUE);
    let stream = match capture::open_input(config.device_name.as_deref(), config.block_size, tx) {
        Ok(stream) => stream,
        Err(e) => {
            log::warn!("[beatfinder] {}; beat detection disabled", e);
            return;
        }
    };
    log::info!(
        "[beatfinder] capturing {} channel(s) at {} Hz",
        stream.channels,
        stream.sample_rate
    );

    let mut detector =
        SpectralFluxDetector::new(stream.sample_rate, config.block_size, config.silence_db);
    let mut tracker = BeatTracker::new(state);
    let started = Instant::now();

    while !stopping.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(period) => {
                let now = started.elapsed().as_secs_f64();
                process_period(&mut detector, &mut tracker, &period, stream.channels, now);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("[beatfinder] input stream closed");
                break;
            }
        }
    }

    drop(stream);
    log::info!("[beatfinder] capture stopped");
}
