use clap::Parser;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::delay::DelayNs;
use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::{CdevPin, Delay};
use onewire_thermo::{
    Config, Mode, ReadCursor, Station, DEFAULT_CONVERSION_POLL_LIMIT, DEFAULT_MAX_REPORTED,
    MAX_DEVICES,
};
use std::time::{Duration, Instant};
use std::{hint, process, thread};

/// Spins for delays below the threshold, sleeps for longer ones
///
/// `thread::sleep` overshoots by tens of microseconds, too much for the slot timings.
struct SpinDelay {
    threshold_us: u32,
    sleep: Delay,
}

impl SpinDelay {
    fn new(threshold_us: u32) -> Self {
        Self {
            threshold_us,
            sleep: Delay,
        }
    }
}

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        if ns / 1_000 >= self.threshold_us {
            self.sleep.delay_ns(ns);
            return;
        }
        let start = Instant::now();
        let duration = Duration::from_nanos(u64::from(ns));
        while start.elapsed() < duration {
            hint::spin_loop();
        }
    }
}

/// Reads DS18B20 temperature sensors on a bit-banged 1-Wire GPIO line
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// GPIO character device (e.g., /dev/gpiochip0)
    #[arg(short, long, default_value = "/dev/gpiochip0")]
    chip: String,
    /// Line offset of the bus pin
    #[arg(short, long, default_value_t = 17)]
    line: u32,
    /// Only one sensor is wired up: skip the ROM search
    #[arg(long)]
    single: bool,
    /// Devices collected per enumeration
    #[arg(long, default_value_t = MAX_DEVICES)]
    max_devices: usize,
    /// Devices read per cycle
    #[arg(short, long, default_value_t = DEFAULT_MAX_REPORTED)]
    report: usize,
    /// Byte polls to wait for a conversion
    #[arg(long, default_value_t = DEFAULT_CONVERSION_POLL_LIMIT)]
    poll_limit: u32,
    /// Read only the temperature bytes, without the scratchpad CRC check
    #[arg(long)]
    no_verify: bool,
    /// Seconds between cycles; reads once when not given
    #[arg(short, long)]
    interval: Option<u64>,
}

fn main() {
    // Initialize the logger
    env_logger::init();
    // Parse command line arguments
    let args = Args::parse();

    let mut chip = Chip::new(&args.chip).expect("Failed to open GPIO chip");
    let handle = chip
        .get_line(args.line)
        .and_then(|line| {
            line.request(
                LineRequestFlags::OUTPUT | LineRequestFlags::OPEN_DRAIN,
                1,
                "w1-thermo",
            )
        })
        .expect("Failed to request GPIO line");
    let pin = CdevPin::new(handle).expect("Failed to create GPIO pin");

    let config = Config::default()
        .with_mode(if args.single { Mode::Single } else { Mode::Search })
        .with_max_devices(args.max_devices)
        .with_max_reported(args.report)
        .with_conversion_poll_limit(args.poll_limit)
        .with_verify_scratchpad(!args.no_verify);
    log::debug!("{:?}", config);
    let station: Station<CriticalSectionRawMutex, _, _> =
        Station::new((pin,), SpinDelay::new(1_000), config);

    loop {
        let mut cursor = ReadCursor::new();
        let mut chunk = [0u8; 64];
        let mut output = Vec::new();
        loop {
            match station.read(&mut cursor, &mut chunk) {
                Ok(0) => break,
                Ok(count) => output.extend_from_slice(&chunk[..count]),
                Err(e) => {
                    log::error!("measurement failed: {}", e);
                    if args.interval.is_none() {
                        process::exit(1);
                    }
                    output.clear();
                    break;
                }
            }
        }
        if !output.is_empty() {
            println!("{}", String::from_utf8_lossy(&output));
        }

        match args.interval {
            Some(seconds) => thread::sleep(Duration::from_secs(seconds)),
            None => break,
        }
    }
}
