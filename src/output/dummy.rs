use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::models::universe::{UniverseValues, UNIVERSE_SIZE};
use crate::output::{OutputDevice, Pacer};

/// Keeps the last frame in memory and paces itself with a timer. Used when no
/// hardware is configured and for dry-mode engines.
#[derive(Debug)]
pub struct DummyDevice {
    name: String,
    universes: Mutex<Vec<UniverseValues>>,
    open: AtomicBool,
    pacer: Pacer,
}

impl DummyDevice {
    pub fn new(name: &str, universe_count: usize, period: Duration) -> Self {
        Self {
            name: name.to_string(),
            universes: Mutex::new(vec![[0; UNIVERSE_SIZE]; universe_count]),
            open: AtomicBool::new(false),
            pacer: Pacer::new(period),
        }
    }
}

impl OutputDevice for DummyDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn universe_count(&self) -> usize {
        self.universes.lock().expect("dummy device poisoned").len()
    }

    fn open(&self) -> Result<()> {
        self.pacer.reset();
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn prepare(&self) -> Result<()> {
        self.pacer.reset();
        Ok(())
    }

    fn set_values(&self, universe: usize, values: &UniverseValues) -> Result<()> {
        if !self.is_open() {
            return Err(EngineError::device(&self.name, "not open"));
        }
        let mut universes = self.universes.lock().expect("dummy device poisoned");
        let slot = universes
            .get_mut(universe)
            .ok_or_else(|| EngineError::device(&self.name, format!("no universe {}", universe)))?;
        *slot = *values;
        Ok(())
    }

    fn get_values(&self, universe: usize) -> Option<UniverseValues> {
        self.universes
            .lock()
            .expect("dummy device poisoned")
            .get(universe)
            .copied()
    }

    fn wait_for_next_sync(&self) -> Result<()> {
        if self.pacer.wait() {
            Ok(())
        } else {
            Err(EngineError::Underrun {
                device: self.name.clone(),
            })
        }
    }

    fn abort(&self) {
        self.pacer.abort();
    }
}
