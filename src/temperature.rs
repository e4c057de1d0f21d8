use crate::ds18b20::Sample;
use core::fmt::{Display, Formatter, Result as FmtResult};

pub const UNIT: &str = "°C";

/// A decoded temperature register: whole degrees and ten-thousandths of a degree
///
/// Negative readings follow the `-(127 - magnitude)` rule of the reference driver rather
/// than two's complement, so existing consumers of the text output see the same numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Temperature {
    integer: i16,
    fraction: u16,
}

impl Temperature {
    pub fn decode(sample: Sample) -> Self {
        Self::from_bytes(sample.lsb, sample.msb)
    }

    pub fn from_bytes(lsb: u8, msb: u8) -> Self {
        let mut integer = i16::from(msb & 0x07) << 4 | i16::from(lsb >> 4);
        let fraction = u16::from(lsb & 0x0F) * 625;
        if msb & 0x80 != 0 {
            integer = -(127 - integer);
        }
        Self { integer, fraction }
    }

    pub fn integer(&self) -> i16 {
        self.integer
    }

    /// Fractional part in steps of 0.0625°C, scaled by 10000
    pub fn fraction(&self) -> u16 {
        self.fraction
    }
}

/// `<integer>,<fraction>°C`, with one zero put in front of fractions below 1000
impl Display for Temperature {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        if self.fraction < 1000 {
            write!(f, "{},0{}{}", self.integer, self.fraction, UNIT)
        } else {
            write!(f, "{},{}{}", self.integer, self.fraction, UNIT)
        }
    }
}
