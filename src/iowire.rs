use embedded_hal::digital::{Error, ErrorType, InputPin, OutputPin, PinState};

/// The single GPIO line the bus runs on
///
/// The line is open drain: devices can only pull it low, the pull-up resistor
/// takes it high whenever nobody drives it.
pub trait IoWire {
    type Error: Error;

    /// Releases the line to high impedance
    fn set_input(&mut self) -> Result<(), Self::Error>;

    /// Drives the line to `level`
    ///
    /// *NOTE* driving high on a shared bus only makes sense for open drain outputs, where it
    /// is the same as releasing the line
    fn set_output(&mut self, level: bool) -> Result<(), Self::Error>;

    /// Samples the electrical level of the line
    fn read_level(&mut self) -> Result<bool, Self::Error>;
}

/// Single open drain pin
impl<IO> IoWire for (IO,)
where
    IO: OutputPin + InputPin,
{
    type Error = IO::Error;

    fn set_input(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_output(&mut self, level: bool) -> Result<(), Self::Error> {
        self.0.set_state(PinState::from(level))
    }

    fn read_level(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }
}

/// Separate sense and drive pins, e.g. behind a transistor buffer
impl<E, I, O> IoWire for (I, O)
where
    E: Error,
    I: ErrorType<Error = E> + InputPin,
    O: ErrorType<Error = E> + OutputPin,
{
    type Error = E;

    fn set_input(&mut self) -> Result<(), Self::Error> {
        self.1.set_high()
    }

    fn set_output(&mut self, level: bool) -> Result<(), Self::Error> {
        self.1.set_state(PinState::from(level))
    }

    fn read_level(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }
}
