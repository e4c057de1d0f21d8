use core::fmt::{Debug, Display, Formatter, Result as FmtResult};

/// Error type
#[derive(Debug)]
pub enum Error<E: Sized + Debug> {
    /// No presence pulse after reset: empty bus or wiring fault
    NoPresence,
    /// Both the bit and its complement read high during a ROM search
    NoDevicesResponding,
    /// The device did not report a finished conversion within the poll limit
    ConversionTimeout,
    /// ROM code CRC mismatch (computed, received)
    CrcMismatch(u8, u8),
    /// Scratchpad CRC mismatch (computed, received)
    ScratchpadCrcMismatch(u8, u8),
    /// The formatted readings do not fit into the report buffer
    ReportOverflow,
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}

impl<E: Sized + Debug> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Error::NoPresence => f.write_str("no presence pulse on the bus"),
            Error::NoDevicesResponding => f.write_str("no device answered the rom search"),
            Error::ConversionTimeout => f.write_str("temperature conversion did not complete"),
            Error::CrcMismatch(computed, received) => write!(
                f,
                "rom code crc mismatch: computed {computed:#04x}, received {received:#04x}"
            ),
            Error::ScratchpadCrcMismatch(computed, received) => write!(
                f,
                "scratchpad crc mismatch: computed {computed:#04x}, received {received:#04x}"
            ),
            Error::ReportOverflow => f.write_str("report buffer too small"),
            Error::PortError(e) => write!(f, "gpio error: {e:?}"),
        }
    }
}
