//! Tick scheduler.
//!
//! [`Management`] runs the mix loop on its own thread. The graph sits behind
//! one edit lock that the tick holds only while mixing; device hand-off and
//! snapshot publication happen after it is released.

mod dry_mode;
mod timing;

pub use timing::Timing;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use beatfinder::BeatFinder;

use crate::error::{EngineError, Result};
use crate::graph::Graph;
use crate::models::universe::{ChannelBuffer, ValueSnapshot};
use crate::output::{devices_from_settings, DummyDevice, OutputDevice, Pacer};
use crate::settings::EngineSettings;

const DEFAULT_IDLE_PERIOD: Duration = Duration::from_millis(25);

struct Shared {
    graph: Mutex<Graph>,
    snapshot: Mutex<Arc<ValueSnapshot>>,
    devices: Mutex<Vec<Arc<dyn OutputDevice>>>,
    beat_finder: Option<Arc<BeatFinder>>,
    started: Instant,
    universe_count: usize,
    stopping: AtomicBool,
    reopen: AtomicBool,
    /// Paces the loop when there is no device to wait on.
    idle: Pacer,
}

pub struct Management {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Management {
    pub fn new(
        graph: Graph,
        devices: Vec<Arc<dyn OutputDevice>>,
        beat_finder: Option<Arc<BeatFinder>>,
    ) -> Self {
        Self::with_parts(graph, devices, beat_finder, Instant::now(), DEFAULT_IDLE_PERIOD, 1)
    }

    /// Builds the engine and its devices from settings. Nothing runs until [`Management::run`].
    pub fn from_settings(
        graph: Graph,
        settings: &EngineSettings,
        beat_finder: Option<Arc<BeatFinder>>,
    ) -> Self {
        Self::with_parts(
            graph,
            devices_from_settings(settings),
            beat_finder,
            Instant::now(),
            settings.tick_period(),
            settings.universe_count,
        )
    }

    fn with_parts(
        graph: Graph,
        devices: Vec<Arc<dyn OutputDevice>>,
        beat_finder: Option<Arc<BeatFinder>>,
        started: Instant,
        idle_period: Duration,
        min_universes: usize,
    ) -> Self {
        let universe_count = devices
            .iter()
            .map(|d| d.universe_count())
            .chain([graph.theatre().universes_used(), min_universes])
            .max()
            .unwrap_or(1)
            .max(1);

        Self {
            shared: Arc::new(Shared {
                graph: Mutex::new(graph),
                snapshot: Mutex::new(Arc::new(ValueSnapshot::blank(universe_count))),
                devices: Mutex::new(devices),
                beat_finder,
                started,
                universe_count,
                stopping: AtomicBool::new(false),
                reopen: AtomicBool::new(false),
                idle: Pacer::new(idle_period),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Starts the tick thread. Calling `run` on a running engine does nothing.
    pub fn run(&self) -> Result<()> {
        let mut handle = self.handle.lock().expect("engine handle poisoned");
        if handle.is_some() {
            return Ok(());
        }
        self.shared.stopping.store(false, Ordering::SeqCst);
        let shared = self.shared.clone();
        let join = thread::Builder::new()
            .name("stagemix-tick".into())
            .spawn(move || tick_loop(shared))?;
        *handle = Some(join);
        Ok(())
    }

    /// Stops the tick thread and waits for it. Devices blocked in a frame wait
    /// are aborted so the thread notices promptly.
    pub fn stop(&self) {
        let join = self.handle.lock().expect("engine handle poisoned").take();
        let Some(join) = join else {
            return;
        };
        self.shared.stopping.store(true, Ordering::SeqCst);
        for device in self.devices() {
            device.abort();
        }
        self.shared.idle.abort();
        if join.join().is_err() {
            log::error!("[engine] tick thread panicked");
        }
        log::info!("[engine] stopped");
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|handle| handle.is_some())
            .unwrap_or(false)
    }

    /// The edit lock. Every structural change goes through this guard; holding
    /// it stalls the tick loop, so keep edits short.
    pub fn edit(&self) -> MutexGuard<'_, Graph> {
        self.shared.graph.lock().expect("graph lock poisoned")
    }

    /// Copy of the most recently published frame.
    pub fn snapshot(&self) -> ValueSnapshot {
        (*self.snapshot_arc()).clone()
    }

    /// The most recently published frame, without copying it.
    pub fn snapshot_arc(&self) -> Arc<ValueSnapshot> {
        self.shared
            .snapshot
            .lock()
            .expect("snapshot lock poisoned")
            .clone()
    }

    pub fn universe_count(&self) -> usize {
        self.shared.universe_count
    }

    pub fn show_time_ms(&self) -> u64 {
        self.shared.started.elapsed().as_millis() as u64
    }

    pub fn beat_finder(&self) -> Option<&Arc<BeatFinder>> {
        self.shared.beat_finder.as_ref()
    }

    pub fn devices(&self) -> Vec<Arc<dyn OutputDevice>> {
        self.shared
            .devices
            .lock()
            .expect("device list poisoned")
            .clone()
    }

    /// Asks the tick loop to retry devices that failed to open.
    pub fn reopen_devices(&self) {
        if self.is_running() {
            self.shared.reopen.store(true, Ordering::SeqCst);
        } else {
            open_devices(&self.devices());
        }
    }

    /// Runs one full tick at `time_ms` on the calling thread, without frame
    /// pacing. Fails while the tick thread is running.
    pub fn tick_at(&self, time_ms: u64) -> Result<Arc<ValueSnapshot>> {
        if self.is_running() {
            return Err(EngineError::InvalidEdit(
                "cannot tick manually while the engine is running".into(),
            ));
        }
        let devices = open_devices(&self.devices());
        let mut buffer = ChannelBuffer::new(self.shared.universe_count);
        let timing = Timing {
            time_ms,
            ..Timing::sample(self.shared.started, 0, self.shared.beat_finder.as_deref())
        };
        let snapshot = Arc::new(self.shared.mix(&mut buffer, &timing));
        deliver(&devices, &snapshot, false);
        self.shared.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// A second engine over a deep copy of the graph, writing to in-memory
    /// devices with the same universe layout. Only the beat finder and the
    /// show clock are shared with this engine.
    pub fn make_dry_mode(&self) -> Result<Management> {
        let graph = {
            let live = self.edit();
            dry_mode::copy_graph(&live)?
        };
        let period = self.shared.idle.period();
        let devices: Vec<Arc<dyn OutputDevice>> = self
            .devices()
            .iter()
            .map(|device| {
                Arc::new(DummyDevice::new(
                    &format!("dry {}", device.name()),
                    device.universe_count(),
                    period,
                )) as Arc<dyn OutputDevice>
            })
            .collect();
        log::info!("[engine] created dry mode with {} controllables", graph.len());
        Ok(Self::with_parts(
            graph,
            devices,
            self.shared.beat_finder.clone(),
            self.shared.started,
            period,
            self.shared.universe_count,
        ))
    }

    /// Exchanges device lists with `other`. Both loops are stopped for the
    /// exchange and whichever was running is restarted.
    pub fn swap_devices(&self, other: &Management) -> Result<()> {
        if Arc::ptr_eq(&self.shared, &other.shared) {
            return Ok(());
        }
        let self_running = self.is_running();
        let other_running = other.is_running();
        self.stop();
        other.stop();

        let mine = std::mem::take(&mut *self.shared.devices.lock().expect("device list poisoned"));
        let theirs = std::mem::replace(
            &mut *other.shared.devices.lock().expect("device list poisoned"),
            mine,
        );
        *self.shared.devices.lock().expect("device list poisoned") = theirs;
        log::info!("[engine] swapped output devices");

        if self_running {
            self.run()?;
        }
        if other_running {
            other.run()?;
        }
        Ok(())
    }
}

impl Drop for Management {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    /// Steps 2-8 of a tick: everything done under the edit lock.
    fn mix(&self, buffer: &mut ChannelBuffer, timing: &Timing) -> ValueSnapshot {
        let mut graph = self.graph.lock().expect("graph lock poisoned");
        buffer.reset();
        graph.mix_tick(buffer, timing);
        buffer.quantize()
    }

    fn publish(&self, snapshot: Arc<ValueSnapshot>) {
        *self.snapshot.lock().expect("snapshot lock poisoned") = snapshot;
    }
}

fn tick_loop(shared: Arc<Shared>) {
    let devices = shared.devices.lock().expect("device list poisoned").clone();
    let mut active = open_devices(&devices);
    let mut buffer = ChannelBuffer::new(shared.universe_count);
    let mut timestep = 0u64;

    log::info!(
        "[engine] running with {} of {} device(s), {} universe(s)",
        active.len(),
        devices.len(),
        shared.universe_count
    );

    while !shared.stopping.load(Ordering::SeqCst) {
        if shared.reopen.swap(false, Ordering::SeqCst) {
            active = open_devices(&devices);
        }

        let timing = Timing::sample(shared.started, timestep, shared.beat_finder.as_deref());
        let snapshot = Arc::new(shared.mix(&mut buffer, &timing));

        if active.is_empty() {
            shared.idle.wait();
        } else {
            deliver(&active, &snapshot, true);
        }
        shared.publish(snapshot);
        timestep += 1;
    }
}

/// Opens whatever is closed. Devices that fail stay out of the returned list
/// until the next reopen.
fn open_devices(devices: &[Arc<dyn OutputDevice>]) -> Vec<Arc<dyn OutputDevice>> {
    devices
        .iter()
        .filter(|device| {
            if device.is_open() {
                return true;
            }
            match device.open() {
                Ok(()) => {
                    log::info!("[engine] opened '{}'", device.name());
                    true
                }
                Err(e) => {
                    log::error!("[engine] '{}' disabled: {}", device.name(), e);
                    false
                }
            }
        })
        .cloned()
        .collect()
}

/// Waits on the first device, then hands every universe to every device.
fn deliver(devices: &[Arc<dyn OutputDevice>], snapshot: &ValueSnapshot, pace: bool) {
    if pace {
        if let Some(pacing) = devices.first() {
            if let Err(e) = pacing.wait_for_next_sync() {
                recover(pacing.as_ref(), &e);
            }
        }
    }
    for device in devices {
        let count = device.universe_count().min(snapshot.universe_count());
        for (universe, values) in snapshot.universes().iter().take(count).enumerate() {
            if let Err(e) = device.set_values(universe, values) {
                recover(device.as_ref(), &e);
                break;
            }
        }
    }
}

fn recover(device: &dyn OutputDevice, error: &EngineError) {
    match error {
        EngineError::Underrun { .. } => {
            log::warn!("[engine] {}", error);
            if let Err(e) = device.prepare() {
                log::error!("[engine] could not prepare '{}': {}", device.name(), e);
            }
        }
        _ => log::error!("[engine] {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FixtureFunction, FunctionType};
    use crate::models::control_value::ControlValue;
    use crate::models::ids::FolderId;

    fn lit_graph() -> Graph {
        let mut graph = Graph::new();
        let fixture = graph
            .add_fixture(
                "par",
                vec![FixtureFunction::new("Dimmer", FunctionType::MasterDimmer, 0, 10)],
            )
            .expect("fits");
        let control = graph
            .add_fixture_control("par", FolderId::ROOT, fixture)
            .expect("control");
        graph
            .add_preset_value(control, 0, ControlValue::MAX)
            .expect("input");
        graph
    }

    #[test]
    fn runs_and_publishes_without_devices() {
        let engine = Management::new(lit_graph(), Vec::new(), None);
        assert_eq!(engine.snapshot().value(0, 10), 0);

        engine.run().expect("thread spawns");
        assert!(engine.is_running());
        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.snapshot().value(0, 10) != 255 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        engine.stop();

        assert!(!engine.is_running());
        assert_eq!(engine.snapshot().value(0, 10), 255);
    }

    #[test]
    fn manual_tick_is_refused_while_running() {
        let engine = Management::new(Graph::new(), Vec::new(), None);
        engine.run().expect("thread spawns");
        assert!(engine.tick_at(0).is_err());
        engine.stop();
        assert!(engine.tick_at(0).is_ok());
    }

    #[test]
    fn published_snapshot_is_not_touched_by_later_ticks() {
        let engine = Management::new(lit_graph(), Vec::new(), None);
        let first = engine.tick_at(0).expect("tick");
        assert_eq!(first.value(0, 10), 255);

        {
            let mut graph = engine.edit();
            let id = graph.preset_values().next().map(|p| p.id).expect("one preset");
            graph.set_preset_value(id, ControlValue::ZERO).expect("exists");
        }
        let second = engine.tick_at(10).expect("tick");

        assert_eq!(first.value(0, 10), 255);
        assert_eq!(second.value(0, 10), 0);
        assert_eq!(engine.snapshot(), *second);
    }
}
