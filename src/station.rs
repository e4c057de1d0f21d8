use crate::ds18b20::{Addressing, Ds18b20};
use crate::{Config, Driver, Error, IoWire, Mode, RomTable, Temperature};
use core::{cell::RefCell, fmt::Debug, fmt::Write};
use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};
use embedded_hal::delay::DelayNs;
use heapless::String;
use log::{debug, warn};

/// Room for [`MAX_DEVICES`](crate::MAX_DEVICES) readings of up to 12 bytes each and their
/// separators
pub const REPORT_CAPACITY: usize = 160;

/// Put between the readings of two devices
pub const SEPARATOR: &str = " | ";

/// Formatted readings of one measurement cycle, e.g. `25,0625°C | 21,5000°C`
pub type Report = String<REPORT_CAPACITY>;

struct Bus<W: IoWire, D> {
    driver: Driver<W>,
    delay: D,
}

/// Position of one streaming reader, with the report it is reading
///
/// The report is taken when the cursor is at offset zero and kept until the cursor is
/// rewound, so every chunk of one read comes from the same cycle.
#[derive(Debug, Clone, Default)]
pub struct ReadCursor {
    offset: usize,
    report: Report,
}

impl ReadCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Moves to `offset` within the current report; zero starts a new cycle on the next read
    pub fn seek(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn rewind(&mut self) {
        self.seek(0);
    }
}

/// Owner of the bus, running whole discovery and read cycles one at a time
///
/// The lock `M` is taken before the first reset of a cycle and released after the last
/// byte of its last transaction, so cycles issued from different contexts never
/// interleave on the wire. A cycle can take seconds while conversions complete: on a
/// single core pick a lock that does not mask interrupts, such as
/// `ThreadModeRawMutex`, and leave `CriticalSectionRawMutex` to hosts where the critical
/// section is an OS mutex.
pub struct Station<M: RawMutex, W: IoWire, D> {
    bus: Mutex<M, RefCell<Bus<W, D>>>,
    config: Config,
}

impl<M: RawMutex, E: Debug, W: IoWire<Error = E>, D: DelayNs> Station<M, W, D> {
    pub fn new(io_wire: W, delay: D, config: Config) -> Self {
        Self {
            bus: Mutex::new(RefCell::new(Bus {
                driver: Driver::new(io_wire),
                delay,
            })),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_inner(self) -> (W, D) {
        let bus = self.bus.into_inner().into_inner();
        (bus.driver.into_inner(), bus.delay)
    }

    /// Runs one discovery and read cycle and returns its report
    pub fn measure(&self) -> Result<Report, Error<E>> {
        self.bus.lock(|bus| bus.borrow_mut().cycle(&self.config))
    }

    /// Streams a report into `buf`, continuing where `cursor` stopped
    ///
    /// A read with the cursor at offset zero runs a fresh cycle; reads further in continue
    /// with the report of that cycle. Returns the number of bytes copied, zero once the
    /// cursor is past the end.
    pub fn read(&self, cursor: &mut ReadCursor, buf: &mut [u8]) -> Result<usize, Error<E>> {
        if buf.is_empty() {
            return Ok(0);
        }
        if cursor.offset == 0 {
            cursor.report = self.measure()?;
        }

        let report = cursor.report.as_bytes();
        if cursor.offset >= report.len() {
            return Ok(0);
        }
        let count = buf.len().min(report.len() - cursor.offset);
        buf[..count].copy_from_slice(&report[cursor.offset..cursor.offset + count]);
        cursor.offset += count;
        Ok(count)
    }
}

impl<E: Debug, W: IoWire<Error = E>, D: DelayNs> Bus<W, D> {
    fn cycle(&mut self, config: &Config) -> Result<Report, Error<E>> {
        let (skip, table) = match config.mode {
            Mode::Single => (Some(Addressing::Skip), RomTable::new()),
            Mode::Search => (
                None,
                self.driver.discover(&mut self.delay, config.max_devices)?,
            ),
        };
        let targets = skip
            .into_iter()
            .chain(table.into_iter().map(Addressing::Match));

        let mut report = Report::new();
        for (i, target) in targets.take(config.max_reported).enumerate() {
            let sample = Ds18b20::from(target).convert_and_read(
                &mut self.driver,
                &mut self.delay,
                &config.session,
            )?;
            let temperature = Temperature::decode(sample);
            debug!("{:?}: {}", target, temperature);

            if i > 0 {
                report
                    .push_str(SEPARATOR)
                    .map_err(|_| Error::ReportOverflow)?;
            }
            write!(report, "{}", temperature).map_err(|_| Error::ReportOverflow)?;
        }

        if report.is_empty() {
            warn!("no temperature read");
        }
        Ok(report)
    }
}
