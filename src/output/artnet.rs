//! Art-Net output: one ArtDmx packet per universe per frame, broadcast and/or
//! unicast on UDP port 6454.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::models::universe::{UniverseValues, UNIVERSE_SIZE};
use crate::output::{OutputDevice, Pacer};
use crate::settings::EngineSettings;

const ARTNET_PORT: u16 = 6454;
const HEADER: &[u8] = b"Art-Net\0";
const OP_OUTPUT: u16 = 0x5000;
const PROTOCOL_VERSION: u16 = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtNetConfig {
    pub interface: String,
    pub broadcast: bool,
    /// Empty to disable unicast.
    pub unicast_ip: String,
    pub net: u8,
    pub subnet: u8,
    pub universe_count: usize,
}

impl Default for ArtNetConfig {
    fn default() -> Self {
        Self {
            interface: "0.0.0.0".to_string(),
            broadcast: true,
            unicast_ip: String::new(),
            net: 0,
            subnet: 0,
            universe_count: 1,
        }
    }
}

impl ArtNetConfig {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            interface: settings.artnet_interface.clone(),
            broadcast: settings.artnet_broadcast,
            unicast_ip: settings.artnet_unicast_ip.clone(),
            net: settings.artnet_net,
            subnet: settings.artnet_subnet,
            universe_count: settings.universe_count,
        }
    }

    fn bind_address(&self) -> String {
        let ip = if self.interface.is_empty() {
            "0.0.0.0"
        } else {
            self.interface.as_str()
        };
        format!("{}:{}", ip, ARTNET_PORT)
    }
}

#[derive(Debug)]
pub struct ArtNetDevice {
    name: String,
    config: ArtNetConfig,
    socket: Mutex<Option<UdpSocket>>,
    universes: Mutex<Vec<UniverseValues>>,
    sequence: AtomicU8,
    pacer: Pacer,
}

impl ArtNetDevice {
    pub fn new(name: &str, config: ArtNetConfig, period: Duration) -> Self {
        let universes = vec![[0; UNIVERSE_SIZE]; config.universe_count];
        Self {
            name: name.to_string(),
            config,
            socket: Mutex::new(None),
            universes: Mutex::new(universes),
            sequence: AtomicU8::new(1),
            pacer: Pacer::new(period),
        }
    }

    pub fn config(&self) -> &ArtNetConfig {
        &self.config
    }
}

impl OutputDevice for ArtNetDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn universe_count(&self) -> usize {
        self.config.universe_count
    }

    fn open(&self) -> Result<()> {
        let mut socket = self.socket.lock().expect("artnet socket poisoned");
        *socket = None;

        let addr = self.config.bind_address();
        let bound = UdpSocket::bind(&addr)
            .map_err(|e| EngineError::device(&self.name, format!("bind {}: {}", addr, e)))?;
        if let Err(e) = bound.set_broadcast(true) {
            log::warn!("[artnet] could not enable broadcast on {}: {}", addr, e);
        }
        log::info!("[artnet] bound to {}", addr);
        *socket = Some(bound);
        self.pacer.reset();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket
            .lock()
            .map(|socket| socket.is_some())
            .unwrap_or(false)
    }

    fn prepare(&self) -> Result<()> {
        self.pacer.reset();
        Ok(())
    }

    fn set_values(&self, universe: usize, values: &UniverseValues) -> Result<()> {
        if universe >= self.config.universe_count {
            return Err(EngineError::device(
                &self.name,
                format!("no universe {}", universe),
            ));
        }
        if let Some(slot) = self
            .universes
            .lock()
            .expect("artnet universes poisoned")
            .get_mut(universe)
        {
            *slot = *values;
        }

        let socket = self.socket.lock().expect("artnet socket poisoned");
        let socket = socket
            .as_ref()
            .ok_or_else(|| EngineError::device(&self.name, "not open"))?;

        let port = port_address(self.config.net, self.config.subnet, universe);
        let packet = build_artdmx_packet(self.sequence.load(Ordering::Relaxed), port, values);

        let unicast = !self.config.unicast_ip.is_empty();
        if unicast {
            let target = format!("{}:{}", self.config.unicast_ip, ARTNET_PORT);
            socket.send_to(&packet, &target)?;
        }
        if self.config.broadcast || !unicast {
            let target = format!("255.255.255.255:{}", ARTNET_PORT);
            socket.send_to(&packet, &target)?;
        }
        Ok(())
    }

    fn get_values(&self, universe: usize) -> Option<UniverseValues> {
        self.universes
            .lock()
            .expect("artnet universes poisoned")
            .get(universe)
            .copied()
    }

    fn wait_for_next_sync(&self) -> Result<()> {
        let on_time = self.pacer.wait();
        next_sequence(&self.sequence);
        if on_time {
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

/// 0 means "sequencing disabled" to receivers, so the counter skips it.
fn next_sequence(sequence: &AtomicU8) {
    let current = sequence.load(Ordering::Relaxed);
    let next = match current.wrapping_add(1) {
        0 => 1,
        n => n,
    };
    sequence.store(next, Ordering::Relaxed);
}

/// 15-bit Port-Address: net in bits 14-8, subnet in 7-4, universe in 3-0.
pub fn port_address(net: u8, subnet: u8, universe: usize) -> u16 {
    (((net & 0x7F) as u16) << 8) | (((subnet & 0x0F) as u16) << 4) | (universe as u16 & 0x0F)
}

pub fn build_artdmx_packet(sequence: u8, port_address: u16, data: &UniverseValues) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER.len() + 10 + UNIVERSE_SIZE);
    packet.extend_from_slice(HEADER);
    // OpCode is little endian, everything after it big endian.
    packet.extend_from_slice(&OP_OUTPUT.to_le_bytes());
    packet.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    packet.push(sequence);
    packet.push(0x00); // physical
    packet.push((port_address & 0xFF) as u8); // SubUni
    packet.push(((port_address >> 8) & 0x7F) as u8); // Net
    packet.extend_from_slice(&(UNIVERSE_SIZE as u16).to_be_bytes());
    packet.extend_from_slice(data);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artdmx_layout() {
        let mut data = [0u8; UNIVERSE_SIZE];
        data[0] = 255;
        data[511] = 7;
        let packet = build_artdmx_packet(42, port_address(1, 2, 3), &data);

        assert_eq!(packet.len(), 18 + UNIVERSE_SIZE);
        assert_eq!(&packet[0..8], b"Art-Net\0");
        assert_eq!(&packet[8..10], &[0x00, 0x50]);
        assert_eq!(&packet[10..12], &[0x00, 0x0E]);
        assert_eq!(packet[12], 42);
        assert_eq!(packet[14], 0x23);
        assert_eq!(packet[15], 0x01);
        assert_eq!(&packet[16..18], &[0x02, 0x00]);
        assert_eq!(packet[18], 255);
        assert_eq!(packet[18 + 511], 7);
    }

    #[test]
    fn port_address_masks_fields() {
        assert_eq!(port_address(0, 0, 0), 0);
        assert_eq!(port_address(0x7F, 0x0F, 0x0F), 0x7FFF);
        assert_eq!(port_address(0xFF, 0xFF, 17), 0x7FF1);
    }

    #[test]
    fn sequence_skips_zero() {
        let sequence = AtomicU8::new(255);
        next_sequence(&sequence);
        assert_eq!(sequence.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unopened_device_refuses_frames() {
        let device = ArtNetDevice::new("artnet", ArtNetConfig::default(), Duration::from_millis(25));
        assert!(!device.is_open());
        assert!(device.set_values(0, &[0; UNIVERSE_SIZE]).is_err());
        assert!(device.set_values(4, &[0; UNIVERSE_SIZE]).is_err());
    }
}
