//! Timing level simulation of a bus with DS18B20 devices, for tests

use crate::{crc8, Address, Driver, IoWire};
use core::convert::Infallible;
use embedded_hal::delay::DelayNs;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

const RESET_MIN_NS: u64 = 480_000;
const WRITE_ZERO_MIN_NS: u64 = 30_000;
const PRESENCE_START_NS: u64 = 15_000;
const PRESENCE_END_NS: u64 = 135_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Reset,
    RomCommand(u8),
    FunctionCommand(u8),
}

#[derive(Debug, Clone)]
pub struct SimDevice {
    rom: [u8; 8],
    scratchpad: [u8; 9],
    conversion_polls: u32,
    answers_search: bool,
    presence_until_ns: u64,
}

impl SimDevice {
    pub fn ds18b20(serial: [u8; 6], lsb: u8, msb: u8) -> Self {
        let rom = *Address::with_crc(0x28, serial);
        let mut scratchpad = [lsb, msb, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0];
        scratchpad[8] = crc8(&scratchpad[..8]);
        Self {
            rom,
            scratchpad,
            conversion_polls: 3,
            answers_search: true,
            presence_until_ns: PRESENCE_END_NS,
        }
    }

    pub fn address(&self) -> Address {
        Address::from(self.rom)
    }

    pub fn with_family(mut self, family: u8) -> Self {
        self.rom[0] = family;
        self.rom[7] = crc8(&self.rom[..7]);
        self
    }

    /// Busy read slots before the conversion reports done
    pub fn with_conversion_polls(mut self, polls: u32) -> Self {
        self.conversion_polls = polls;
        self
    }

    pub fn with_presence_until_us(mut self, us: u64) -> Self {
        self.presence_until_ns = us * 1_000;
        self
    }

    pub fn with_corrupt_rom(mut self) -> Self {
        self.rom[7] ^= 0xFF;
        self
    }

    pub fn with_corrupt_scratchpad(mut self) -> Self {
        self.scratchpad[8] ^= 0xFF;
        self
    }

    /// Answers resets but never takes part in a ROM search
    pub fn silent_in_search(mut self) -> Self {
        self.answers_search = false;
        self
    }

    fn rom_bit(&self, index: u8) -> bool {
        self.rom[(index / 8) as usize] & (1 << (index % 8)) != 0
    }

    fn scratchpad_bit(&self, index: u16) -> bool {
        match self.scratchpad.get((index / 8) as usize) {
            Some(byte) => byte & (1 << (index % 8)) != 0,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchStep {
    Bit,
    Complement,
    Direction,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    RomCommand { bits: u8, value: u8 },
    Search { bit: u8, step: SearchStep },
    Match { bits: u8, rom: [u8; 8] },
    FunctionCommand { bits: u8, value: u8 },
    Converting,
    Scratchpad { bit: u16 },
}

struct Sim {
    now_ns: u64,
    low_since: Option<u64>,
    slot_open: bool,
    reset_released_at: Option<u64>,
    stuck_low: bool,
    devices: Vec<SimDevice>,
    selected: Vec<bool>,
    conversion_left: Vec<u32>,
    phase: Phase,
    low_pulses: Vec<u64>,
    events: Vec<Event>,
    ops: Vec<ThreadId>,
}

impl Sim {
    fn line(&self) -> bool {
        if self.low_since.is_some() {
            return false;
        }
        match self.reset_released_at {
            Some(released) if !self.devices.is_empty() => {
                let since = self.now_ns - released;
                let presence = self
                    .devices
                    .iter()
                    .any(|d| (PRESENCE_START_NS..d.presence_until_ns).contains(&since));
                !(presence || (self.stuck_low && since >= PRESENCE_START_NS))
            }
            _ => true,
        }
    }

    fn drive_low(&mut self) {
        self.flush();
        if self.low_since.is_none() {
            self.low_since = Some(self.now_ns);
        }
    }

    fn release(&mut self) {
        let Some(start) = self.low_since.take() else {
            return;
        };
        let width = self.now_ns - start;
        self.low_pulses.push(width);
        if width >= RESET_MIN_NS {
            self.bus_reset();
        } else if width >= WRITE_ZERO_MIN_NS {
            self.device_write(false);
        } else {
            self.slot_open = true;
        }
    }

    fn sample(&mut self) -> bool {
        if self.slot_open {
            self.slot_open = false;
            let bit = self.device_read();
            bit && self.line()
        } else {
            self.line()
        }
    }

    /// A short slot nobody sampled was a written one
    fn flush(&mut self) {
        if self.slot_open {
            self.slot_open = false;
            self.device_write(true);
        }
    }

    fn bus_reset(&mut self) {
        self.events.push(Event::Reset);
        self.reset_released_at = Some(self.now_ns);
        self.selected = vec![false; self.devices.len()];
        self.phase = Phase::RomCommand { bits: 0, value: 0 };
    }

    fn all_selected(&self, mut f: impl FnMut(&SimDevice) -> bool) -> bool {
        self.devices
            .iter()
            .zip(&self.selected)
            .filter(|(_, selected)| **selected)
            .all(|(device, _)| f(device))
    }

    fn device_write(&mut self, bit: bool) {
        self.phase = match self.phase {
            Phase::RomCommand { bits, value } => {
                let value = value | (bit as u8) << bits;
                if bits < 7 {
                    Phase::RomCommand {
                        bits: bits + 1,
                        value,
                    }
                } else {
                    self.events.push(Event::RomCommand(value));
                    self.rom_command(value)
                }
            }
            Phase::Search {
                bit: index,
                step: SearchStep::Direction,
            } => {
                for (device, selected) in self.devices.iter().zip(self.selected.iter_mut()) {
                    *selected &= device.rom_bit(index) == bit;
                }
                if index == Address::BITS - 1 {
                    Phase::FunctionCommand { bits: 0, value: 0 }
                } else {
                    Phase::Search {
                        bit: index + 1,
                        step: SearchStep::Bit,
                    }
                }
            }
            Phase::Match { bits, mut rom } => {
                rom[(bits / 8) as usize] |= (bit as u8) << (bits % 8);
                if bits < Address::BITS - 1 {
                    Phase::Match {
                        bits: bits + 1,
                        rom,
                    }
                } else {
                    self.selected = self.devices.iter().map(|d| d.rom == rom).collect();
                    Phase::FunctionCommand { bits: 0, value: 0 }
                }
            }
            Phase::FunctionCommand { bits, value } => {
                let value = value | (bit as u8) << bits;
                if bits < 7 {
                    Phase::FunctionCommand {
                        bits: bits + 1,
                        value,
                    }
                } else {
                    self.events.push(Event::FunctionCommand(value));
                    self.function_command(value)
                }
            }
            phase => phase,
        };
    }

    fn rom_command(&mut self, value: u8) -> Phase {
        match value {
            0xF0 => {
                self.selected = self.devices.iter().map(|d| d.answers_search).collect();
                Phase::Search {
                    bit: 0,
                    step: SearchStep::Bit,
                }
            }
            0x55 => Phase::Match {
                bits: 0,
                rom: [0; 8],
            },
            0xCC => {
                self.selected = vec![true; self.devices.len()];
                Phase::FunctionCommand { bits: 0, value: 0 }
            }
            _ => Phase::Idle,
        }
    }

    fn function_command(&mut self, value: u8) -> Phase {
        match value {
            0x44 => {
                self.conversion_left = self.devices.iter().map(|d| d.conversion_polls).collect();
                Phase::Converting
            }
            0xBE => Phase::Scratchpad { bit: 0 },
            _ => Phase::Idle,
        }
    }

    fn device_read(&mut self) -> bool {
        match self.phase {
            Phase::Search {
                bit,
                step: SearchStep::Bit,
            } => {
                self.phase = Phase::Search {
                    bit,
                    step: SearchStep::Complement,
                };
                self.all_selected(|d| d.rom_bit(bit))
            }
            Phase::Search {
                bit,
                step: SearchStep::Complement,
            } => {
                self.phase = Phase::Search {
                    bit,
                    step: SearchStep::Direction,
                };
                self.all_selected(|d| !d.rom_bit(bit))
            }
            Phase::Converting => {
                let mut done = true;
                for (left, selected) in self.conversion_left.iter_mut().zip(&self.selected) {
                    if *selected && *left > 0 {
                        *left -= 1;
                        done = false;
                    }
                }
                done
            }
            Phase::Scratchpad { bit } => {
                self.phase = Phase::Scratchpad { bit: bit + 1 };
                self.all_selected(|d| d.scratchpad_bit(bit))
            }
            _ => true,
        }
    }

    fn record_op(&mut self) {
        self.ops.push(thread::current().id());
    }
}

/// Shared handle to a simulated bus
#[derive(Clone)]
pub struct SimBus {
    inner: Arc<Mutex<Sim>>,
}

impl SimBus {
    pub fn new(devices: Vec<SimDevice>) -> Self {
        let sim = Sim {
            now_ns: 0,
            low_since: None,
            slot_open: false,
            reset_released_at: None,
            stuck_low: false,
            selected: vec![false; devices.len()],
            conversion_left: vec![0; devices.len()],
            devices,
            phase: Phase::Idle,
            low_pulses: Vec::new(),
            events: Vec::new(),
            ops: Vec::new(),
        };
        Self {
            inner: Arc::new(Mutex::new(sim)),
        }
    }

    /// Devices pull the line down after a reset and never let go
    pub fn stuck_low(self) -> Self {
        self.lock().stuck_low = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Sim> {
        self.inner.lock().unwrap()
    }

    pub fn wire(&self) -> SimWire {
        SimWire {
            inner: self.inner.clone(),
        }
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay {
            inner: self.inner.clone(),
        }
    }

    pub fn driver(&self) -> Driver<SimWire> {
        Driver::new(self.wire())
    }

    pub fn now_us(&self) -> u64 {
        self.lock().now_ns / 1_000
    }

    pub fn events(&self) -> Vec<Event> {
        let mut sim = self.lock();
        sim.flush();
        sim.events.clone()
    }

    pub fn low_pulses(&self) -> Vec<u64> {
        self.lock().low_pulses.clone()
    }

    /// Threads in the order they touched the wire
    pub fn ops(&self) -> Vec<ThreadId> {
        self.lock().ops.clone()
    }

    /// Changes the temperature register of the device at `index`, keeping its CRC valid
    pub fn set_temperature(&self, index: usize, lsb: u8, msb: u8) {
        let mut sim = self.lock();
        let scratchpad = &mut sim.devices[index].scratchpad;
        scratchpad[..2].copy_from_slice(&[lsb, msb]);
        scratchpad[8] = crc8(&scratchpad[..8]);
    }

    pub fn clear_log(&self) {
        let mut sim = self.lock();
        sim.flush();
        sim.events.clear();
        sim.low_pulses.clear();
        sim.ops.clear();
    }
}

pub struct SimWire {
    inner: Arc<Mutex<Sim>>,
}

impl IoWire for SimWire {
    type Error = Infallible;

    fn set_input(&mut self) -> Result<(), Self::Error> {
        let mut sim = self.inner.lock().unwrap();
        sim.record_op();
        sim.release();
        Ok(())
    }

    fn set_output(&mut self, level: bool) -> Result<(), Self::Error> {
        let mut sim = self.inner.lock().unwrap();
        sim.record_op();
        if level {
            sim.release();
        } else {
            sim.drive_low();
        }
        Ok(())
    }

    fn read_level(&mut self) -> Result<bool, Self::Error> {
        let mut sim = self.inner.lock().unwrap();
        sim.record_op();
        Ok(sim.sample())
    }
}

pub struct SimDelay {
    inner: Arc<Mutex<Sim>>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.inner.lock().unwrap().now_ns += u64::from(ns);
    }
}
