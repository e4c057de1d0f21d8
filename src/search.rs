use crate::{Address, Command, Driver, Error, IoWire};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use heapless::Vec;
use log::{debug, info, warn};

/// Upper bound of devices collected by one enumeration
pub const MAX_DEVICES: usize = 10;

/// ROM codes found by one enumeration, in search order
pub type RomTable = Vec<Address, MAX_DEVICES>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    NotStarted,
    Searching,
    Exhausted,
}

/// State of one ROM search, owned by whoever drives the enumeration
#[derive(Debug, Clone, Default)]
pub struct DeviceSearch {
    address: Address,
    /// 1-based bit position of the last branch where 0 was taken while 1 is still
    /// unexplored, 0 when there is none
    last_discrepancy: u8,
    phase: Phase,
}

impl DeviceSearch {
    pub fn new() -> DeviceSearch {
        DeviceSearch::default()
    }

    /// Rewinds to the start of the tree
    pub fn restart(&mut self) {
        self.last_discrepancy = 0;
        self.phase = Phase::NotStarted;
    }

    pub fn last_discrepancy(&self) -> u8 {
        self.last_discrepancy
    }

    /// True once the last ROM code of the tree has been returned
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Exhausted
    }

    pub fn into_iter<'a, W: IoWire, D: DelayNs>(
        self,
        wire: &'a mut Driver<W>,
        delay: &'a mut D,
    ) -> DeviceSearchIter<'a, W, D> {
        DeviceSearchIter {
            search: Some(self),
            wire,
            delay,
        }
    }

    /// Direction to take at a bit where devices disagree
    fn branch(&self, position: u8) -> bool {
        if position < self.last_discrepancy {
            self.address.bit(position - 1)
        } else {
            position == self.last_discrepancy
        }
    }
}

pub struct DeviceSearchIter<'a, W: IoWire, D: DelayNs> {
    search: Option<DeviceSearch>,
    wire: &'a mut Driver<W>,
    delay: &'a mut D,
}

impl<'a, W: IoWire, D: DelayNs> Iterator for DeviceSearchIter<'a, W, D> {
    type Item = Result<Address, Error<W::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut search = self.search.take()?;
        let result = self
            .wire
            .search_next(&mut search, &mut *self.delay)
            .transpose()?;
        // errors end the iteration
        if result.is_ok() {
            self.search = Some(search);
        }
        Some(result)
    }
}

impl<E: Debug, W: IoWire<Error = E>> Driver<W> {
    /// Starts a fresh enumeration and returns the first ROM code
    pub fn search_first(
        &mut self,
        search: &mut DeviceSearch,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Address>, Error<E>> {
        search.restart();
        self.search_next(search, delay)
    }

    /// Walks the next branch of the ROM tree
    ///
    /// Returns `Ok(None)` once the tree is exhausted or when nobody answers the reset.
    pub fn search_next(
        &mut self,
        search: &mut DeviceSearch,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Address>, Error<E>> {
        if search.is_done() || !self.reset_presence(delay)? {
            search.last_discrepancy = 0;
            return Ok(None);
        }
        search.phase = Phase::Searching;

        self.send_command(delay, Command::SearchRom)?;

        let mut marker = 0;
        for position in 1..=Address::BITS {
            let bit = self.read_bit(delay)?;
            let complement = self.read_bit(delay)?;

            let direction = match (bit, complement) {
                (true, true) => {
                    search.last_discrepancy = 0;
                    return Err(Error::NoDevicesResponding);
                }
                (false, false) => {
                    let direction = search.branch(position);
                    if !direction {
                        marker = position;
                    }
                    direction
                }
                (bit, _) => bit,
            };

            search.address.set_bit(position - 1, direction);
            self.write_bit(delay, direction)?;
        }

        let address = search.address;
        if !address.is_crc_valid() {
            warn!("rom code {} failed crc check", address);
            search.last_discrepancy = 0;
            return Err(Error::CrcMismatch(address.compute_crc8(), address.crc()));
        }

        search.last_discrepancy = marker;
        if marker == 0 {
            search.phase = Phase::Exhausted;
        }
        Ok(Some(address))
    }

    /// Enumerates the devices on the bus, at most `limit` of them
    ///
    /// Fails with [`Error::NoPresence`] when nothing answers the initial reset.
    pub fn discover(
        &mut self,
        delay: &mut impl DelayNs,
        limit: usize,
    ) -> Result<RomTable, Error<E>> {
        self.reset(delay)?;

        let limit = limit.min(MAX_DEVICES);
        let mut table = RomTable::new();
        let mut search = DeviceSearch::new();
        while table.len() < limit {
            let Some(address) = self.search_next(&mut search, delay)? else {
                break;
            };
            debug!("rom code {}", address);
            if table.push(address).is_err() {
                break;
            }
        }

        info!("{} sensor(s) found", table.len());
        Ok(table)
    }
}
