use byteorder::{ByteOrder, LittleEndian};
use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::{crc8, Address, Driver, Error, IoWire, OpCode, SessionConfig};

pub const FAMILY_CODE: u8 = 0x28;

/// Length of the scratchpad including its CRC byte
pub const SCRATCHPAD_BYTES: usize = 9;

/// Function commands, sent after the device has been addressed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Convert = 0x44,
    ReadScratchpad = 0xBE,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// Which devices the function commands of a transaction go to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// Every device on the bus; only sensible with a single device wired up
    Skip,
    Match(Address),
}

/// The two bytes of the temperature register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub lsb: u8,
    pub msb: u8,
}

impl Sample {
    pub fn from_scratchpad(scratchpad: &[u8; SCRATCHPAD_BYTES]) -> Self {
        Self {
            lsb: scratchpad[0],
            msb: scratchpad[1],
        }
    }

    /// Register value as the device stores it
    pub fn raw(&self) -> u16 {
        LittleEndian::read_u16(&[self.lsb, self.msb])
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ds18b20 {
    addressing: Addressing,
}

impl From<Address> for Ds18b20 {
    fn from(address: Address) -> Self {
        Self::new(address)
    }
}

impl From<Addressing> for Ds18b20 {
    fn from(addressing: Addressing) -> Self {
        Self { addressing }
    }
}

impl Ds18b20 {
    pub fn new(address: Address) -> Self {
        Self {
            addressing: Addressing::Match(address),
        }
    }

    /// The one device on a bus without searching for it
    pub fn single() -> Self {
        Self {
            addressing: Addressing::Skip,
        }
    }

    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    fn select<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        driver.reset(delay)?;
        match &self.addressing {
            Addressing::Skip => driver.skip_rom(delay)?,
            Addressing::Match(address) => driver.match_rom(delay, address)?,
        }
        Ok(())
    }

    pub fn start_conversion<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<W::Error>> {
        self.select(driver, delay)?;
        driver.send_command(delay, Command::Convert)?;
        Ok(())
    }

    /// Polls until the device releases the bus at the end of the conversion
    ///
    /// Returns the number of polls it took.
    pub fn wait_for_conversion<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        poll_limit: u32,
    ) -> Result<u32, Error<W::Error>> {
        for poll in 1..=poll_limit {
            if driver.read_byte(delay)? != 0 {
                return Ok(poll);
            }
        }
        warn!("conversion still running after {} polls", poll_limit);
        Err(Error::ConversionTimeout)
    }

    /// Reads the temperature register, optionally with the rest of the scratchpad to check
    /// its CRC
    pub fn read_scratchpad<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        verify: bool,
    ) -> Result<Sample, Error<W::Error>> {
        self.select(driver, delay)?;
        driver.send_command(delay, Command::ReadScratchpad)?;

        let mut scratchpad = [0u8; SCRATCHPAD_BYTES];
        let len = if verify { SCRATCHPAD_BYTES } else { 2 };
        driver.read_bytes(delay, &mut scratchpad[..len])?;

        if verify {
            let computed = crc8(&scratchpad[..SCRATCHPAD_BYTES - 1]);
            let received = scratchpad[SCRATCHPAD_BYTES - 1];
            if computed != received {
                warn!("scratchpad {:02x?} failed crc check", scratchpad);
                return Err(Error::ScratchpadCrcMismatch(computed, received));
            }
        }
        Ok(Sample::from_scratchpad(&scratchpad))
    }

    /// Runs a full conversion and reads the result back
    pub fn convert_and_read<W: IoWire>(
        &self,
        driver: &mut Driver<W>,
        delay: &mut impl DelayNs,
        config: &SessionConfig,
    ) -> Result<Sample, Error<W::Error>> {
        if let Addressing::Match(address) = &self.addressing {
            debug!("reading temperature from rom {}", address);
            if address.family_code() != FAMILY_CODE {
                debug!("unexpected family code {:#04x}", address.family_code());
            }
        }
        self.start_conversion(driver, delay)?;
        self.wait_for_conversion(driver, delay, config.conversion_poll_limit)?;
        self.read_scratchpad(driver, delay, config.verify_scratchpad)
    }
}
