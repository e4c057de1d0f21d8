use crate::MAX_DEVICES;

/// Conversion polls allowed by default; one poll is a byte read of roughly 0.5ms, which
/// covers the 750ms of a 12 bit conversion with some headroom
pub const DEFAULT_CONVERSION_POLL_LIMIT: u32 = 2_000;

/// Readings put into one report by default
pub const DEFAULT_MAX_REPORTED: usize = 2;

/// How a measurement cycle picks its devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Enumerate the bus with a ROM search and address each device by its code
    #[default]
    Search,
    /// Exactly one device is wired up: no search, every command goes out with Skip-ROM
    Single,
}

/// Settings of one conversion + scratchpad transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Byte polls to wait for the end of a conversion before giving up
    pub conversion_poll_limit: u32,
    /// Read the whole scratchpad and check its CRC instead of just the two temperature bytes
    pub verify_scratchpad: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            conversion_poll_limit: DEFAULT_CONVERSION_POLL_LIMIT,
            verify_scratchpad: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub mode: Mode,
    /// Devices collected by one enumeration, capped at [`MAX_DEVICES`]
    pub max_devices: usize,
    /// Devices read and reported per cycle
    pub max_reported: usize,
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            max_devices: MAX_DEVICES,
            max_reported: DEFAULT_MAX_REPORTED,
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_devices(mut self, max_devices: usize) -> Self {
        self.max_devices = max_devices.min(MAX_DEVICES);
        self
    }

    pub fn with_max_reported(mut self, max_reported: usize) -> Self {
        self.max_reported = max_reported;
        self
    }

    pub fn with_conversion_poll_limit(mut self, limit: u32) -> Self {
        self.session.conversion_poll_limit = limit;
        self
    }

    pub fn with_verify_scratchpad(mut self, verify: bool) -> Self {
        self.session.verify_scratchpad = verify;
        self
    }
}
