#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]

mod address;
mod command;
mod config;
mod driver;
pub mod ds18b20;
mod iowire;
mod result;
mod search;
#[cfg(test)]
mod sim;
mod station;
mod temperature;

pub use address::{Address, AddressError};
pub use command::{Command, OpCode};
pub use config::{
    Config, Mode, SessionConfig, DEFAULT_CONVERSION_POLL_LIMIT, DEFAULT_MAX_REPORTED,
};
pub use driver::Driver;
pub use iowire::IoWire;
pub use result::Error;
pub use search::{DeviceSearch, DeviceSearchIter, RomTable, MAX_DEVICES};
pub use station::{ReadCursor, Report, Station, REPORT_CAPACITY, SEPARATOR};
pub use temperature::{Temperature, UNIT};

/// Dallas/Maxim CRC8 (x^8 + x^5 + x^4 + 1) of `data`, starting from zero
pub fn crc8(data: &[u8]) -> u8 {
    compute_partial_crc8(0, data)
}

/// Continues a running CRC8 over `data`, least significant bit of each byte first
pub fn compute_partial_crc8(crc: u8, data: &[u8]) -> u8 {
    let mut crc = crc;
    for byte in data.iter() {
        let mut byte = *byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0x00 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}
