use crate::{compute_partial_crc8, crc8};
use byteorder::{ByteOrder, LittleEndian};
use core::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::Deref,
    str::FromStr,
};

/// 64-bit ROM code identifying one device: family, 48-bit serial, CRC8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Address {
    raw: [u8; Self::BYTES as usize],
}

impl Default for Address {
    fn default() -> Self {
        Self::from([0; Self::BYTES as usize])
    }
}

impl From<[u8; Self::BYTES as usize]> for Address {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        Address { raw }
    }
}

impl From<Address> for [u8; Address::BYTES as usize] {
    fn from(addr: Address) -> [u8; Address::BYTES as usize] {
        addr.raw
    }
}

impl Deref for Address {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl Address {
    /// The length of device address in bytes
    pub const BYTES: u8 = 8;

    /// The length of device address in bits
    pub const BITS: u8 = Self::BYTES * 8;

    /// Builds a ROM code from family and serial, filling in the CRC byte
    pub fn with_crc(family_code: u8, serial: [u8; 6]) -> Self {
        let mut raw = [0; Self::BYTES as usize];
        raw[0] = family_code;
        raw[1..7].copy_from_slice(&serial);
        raw[7] = crc8(&raw[..7]);
        Self { raw }
    }

    pub fn family_code(&self) -> u8 {
        self.raw[0]
    }

    /// The 48-bit serial number, stored little endian in bytes 1 to 6
    pub fn serial_number(&self) -> u64 {
        LittleEndian::read_u48(&self.raw[1..7])
    }

    pub fn crc(&self) -> u8 {
        self.raw[7]
    }

    /// CRC8 over family and serial
    pub fn compute_crc8(&self) -> u8 {
        compute_partial_crc8(0, &self.raw[..7])
    }

    pub fn is_crc_valid(&self) -> bool {
        self.compute_crc8() == self.crc()
    }

    /// Bit `index` of the code in bus order: bit 0 is the low bit of the family code
    pub(crate) fn bit(&self, index: u8) -> bool {
        self.raw[(index / 8) as usize] & (1 << (index % 8)) != 0
    }

    pub(crate) fn set_bit(&mut self, index: u8, value: bool) {
        let mask = 1 << (index % 8);
        let byte = &mut self.raw[(index / 8) as usize];
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }
}

/// Error type
#[derive(Debug, PartialEq, Eq)]
pub enum AddressError {
    NotEnough,
    TooMany,
    Invalid,
}

impl FromStr for Address {
    type Err = AddressError;

    /// Parses 16 hex digits in bus order, optionally separated by spaces or colons
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut raw = [0u8; Self::BYTES as usize];
        let mut digits = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .map(|c| c.to_digit(16).map(|d| d as u8));

        for byte in raw.iter_mut() {
            match (digits.next(), digits.next()) {
                (Some(Some(h)), Some(Some(l))) => *byte = (h << 4) | l,
                (Some(None), _) | (_, Some(None)) => return Err(AddressError::Invalid),
                _ => return Err(AddressError::NotEnough),
            }
        }
        if digits.next().is_some() {
            return Err(AddressError::TooMany);
        }

        Ok(Self::from(raw))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        for (i, byte) in self.raw.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
