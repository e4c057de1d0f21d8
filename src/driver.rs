use crate::{Address, Command, Error, IoWire, OpCode};
use core::{fmt::Debug, ops::RangeInclusive};
use embedded_hal::delay::DelayNs;
use log::warn;

/// Low time of the reset pulse
const RESET_LOW_US: RangeInclusive<u32> = 480..=500;
/// Wait after releasing the reset pulse before polling for presence
const RESET_SETTLE_US: RangeInclusive<u32> = 15..=20;
const RESET_POLL_US: u32 = 5;
/// Polls spent waiting for the presence pulse and its release
const RESET_POLL_RETRIES: u32 = 50;
const RESET_GUARD_US: u32 = 5;

const READ_LOW_US: u32 = 5;
const READ_SAMPLE_US: u32 = 10;
const READ_RECOVERY_US: RangeInclusive<u32> = 50..=55;

const WRITE_ONE_LOW_US: u32 = 5;
const WRITE_ONE_RELEASE_US: RangeInclusive<u32> = 60..=65;
const WRITE_ZERO_LOW_US: RangeInclusive<u32> = 60..=65;
const WRITE_ZERO_RELEASE_US: u32 = 5;

/// Sleeps somewhere in `range`; only the lower bound is guaranteed
#[inline(always)]
fn delay_range(delay: &mut impl DelayNs, range: RangeInclusive<u32>) {
    delay.delay_us(*range.start());
}

/// Bit-banging bus master on a single [`IoWire`]
pub struct Driver<W: IoWire> {
    io_wire: W,
}

impl<E: Debug, W: IoWire<Error = E>> Driver<W> {
    pub fn new(io_wire: W) -> Self {
        Driver { io_wire }
    }

    pub fn into_inner(self) -> W {
        self.io_wire
    }

    /// Sends a reset pulse and waits for a device to answer with a presence pulse
    ///
    /// Succeeds only once the line was seen pulled down and released again within 50 polls.
    /// A release seen on the very last poll still counts as a timeout.
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        self.set_low()?;
        delay_range(delay, RESET_LOW_US);
        self.release()?;
        delay_range(delay, RESET_SETTLE_US);

        let mut pulled_down = false;
        for poll in 1..=RESET_POLL_RETRIES {
            delay.delay_us(RESET_POLL_US);
            let high = self.is_high()?;
            if !high {
                pulled_down = true;
            } else if pulled_down && poll < RESET_POLL_RETRIES {
                delay.delay_us(RESET_GUARD_US);
                return Ok(());
            }
        }

        warn!("failed to reset onewire bus ({} retries)", RESET_POLL_RETRIES);
        Err(Error::NoPresence)
    }

    /// Like [`Driver::reset`], but maps a missing presence pulse to `Ok(false)`
    pub fn reset_presence(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        self.reset(delay).map(|_| true).or_else(|error| {
            if matches!(error, Error::NoPresence) {
                Ok(false)
            } else {
                Err(error)
            }
        })
    }

    /// Addresses every device on the bus at once
    pub fn skip_rom(&mut self, delay: &mut impl DelayNs) -> Result<(), E> {
        self.send_command(delay, Command::SkipRom)
    }

    /// Addresses the single device with the given ROM code
    pub fn match_rom(&mut self, delay: &mut impl DelayNs, addr: &Address) -> Result<(), E> {
        self.send_command(delay, Command::MatchRom)?;
        self.write_bytes(delay, addr.as_ref())
    }

    pub fn send_command(&mut self, delay: &mut impl DelayNs, cmd: impl OpCode) -> Result<(), E> {
        self.write_byte(delay, cmd.op_code())
    }

    pub fn read_bytes(&mut self, delay: &mut impl DelayNs, dst: &mut [u8]) -> Result<(), E> {
        for d in dst {
            *d = self.read_byte(delay)?;
        }
        Ok(())
    }

    pub fn read_byte(&mut self, delay: &mut impl DelayNs) -> Result<u8, E> {
        let mut byte = 0_u8;
        for _ in 0..8 {
            byte >>= 1;
            if self.read_bit(delay)? {
                byte |= 0x80;
            }
        }
        Ok(byte)
    }

    /// Opens a read slot and samples what the devices answer; an idle bus reads as `true`
    ///
    /// The slot up to the sample runs inside a critical section.
    pub fn read_bit(&mut self, delay: &mut impl DelayNs) -> Result<bool, E> {
        let val = critical_section::with(|_| {
            self.set_low()?;
            delay.delay_us(READ_LOW_US);
            self.release()?;
            delay.delay_us(READ_SAMPLE_US);
            self.is_high()
        })?;
        delay_range(delay, READ_RECOVERY_US);
        Ok(val)
    }

    pub fn write_bytes(&mut self, delay: &mut impl DelayNs, bytes: &[u8]) -> Result<(), E> {
        for b in bytes {
            self.write_byte(delay, *b)?;
        }
        Ok(())
    }

    pub fn write_byte(&mut self, delay: &mut impl DelayNs, byte: u8) -> Result<(), E> {
        let mut byte = byte;
        for _ in 0..8 {
            self.write_bit(delay, (byte & 0x01) == 0x01)?;
            byte >>= 1;
        }
        Ok(())
    }

    /// A one is a short low pulse followed by a long release, a zero the opposite
    ///
    /// Only the low pulse runs inside a critical section, the release time may stretch.
    pub fn write_bit(&mut self, delay: &mut impl DelayNs, high: bool) -> Result<(), E> {
        let low_us = if high {
            WRITE_ONE_LOW_US
        } else {
            *WRITE_ZERO_LOW_US.start()
        };
        critical_section::with(|_| {
            self.set_low()?;
            delay.delay_us(low_us);
            self.release()
        })?;
        if high {
            delay_range(delay, WRITE_ONE_RELEASE_US);
        } else {
            delay.delay_us(WRITE_ZERO_RELEASE_US);
        }
        Ok(())
    }

    #[inline(always)]
    pub(crate) fn release(&mut self) -> Result<(), E> {
        self.io_wire.set_input()
    }

    #[inline(always)]
    pub(crate) fn set_low(&mut self) -> Result<(), E> {
        self.io_wire.set_output(false)
    }

    #[inline(always)]
    pub(crate) fn is_high(&mut self) -> Result<bool, E> {
        self.io_wire.read_level()
    }
}
