use core::convert::Infallible;
use embedded_hal::digital::{ErrorType, OutputPin, PinState};

/// Placeholder for boards without a modem power control line.
pub struct NoPin;

impl ErrorType for NoPin {
    type Error = Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Inverts an output pin, for power keys wired active-low.
pub struct ReverseOutputPin<P: OutputPin<Error = Infallible>>(pub P);

impl<P: OutputPin<Error = Infallible>> ErrorType for ReverseOutputPin<P> {
    type Error = Infallible;
}

impl<P: OutputPin<Error = Infallible>> OutputPin for ReverseOutputPin<P> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn set_state(&mut self, state: PinState) -> Result<(), Self::Error> {
        match state {
            PinState::Low => self.0.set_state(PinState::High),
            PinState::High => self.0.set_state(PinState::Low),
        }
    }
}

/// Board-level wiring of the modem.
///
/// The power pin, when present, is pulsed high to power-cycle an unresponsive
/// module. Without one the driver can only log that the modem is gone.
pub trait ModemConfig {
    type PowerPin: OutputPin;

    fn power_pin(&mut self) -> Option<&mut Self::PowerPin>;

    /// SIM PIN to enter when the module reports `+CPIN: SIM PIN`.
    fn pin_code(&self) -> Option<&str> {
        None
    }
}
