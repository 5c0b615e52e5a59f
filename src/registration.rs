/// Network registration status as reported by `+CREG:`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    #[default]
    None,
    NotRegistering,
    Home,
    Searching,
    Denied,
    OutOfCoverage,
    Roaming,
}

impl From<u8> for Status {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::NotRegistering,
            1 => Self::Home,
            2 => Self::Searching,
            3 => Self::Denied,
            4 => Self::OutOfCoverage,
            5 => Self::Roaming,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationStatus {
    status: Status,
}

impl RegistrationStatus {
    pub const fn new() -> Self {
        Self {
            status: Status::None,
        }
    }

    pub fn reset(&mut self) {
        self.status = Status::None;
    }

    pub fn set_status(&mut self, stat: Status) {
        self.status = stat;
    }

    pub fn registered(&self) -> bool {
        matches!(self.status, Status::Home | Status::Roaming)
    }
}

/// SIM PIN handshake status, driven by `+CPIN:` notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct PinStatus {
    pub required: bool,
    pub accepted: bool,
}

impl PinStatus {
    pub const fn new() -> Self {
        Self {
            required: false,
            accepted: false,
        }
    }

    /// Apply a `+CPIN: <code>` report. Returns `true` when the code was a
    /// supported one (`READY` / `SIM PIN`).
    pub fn apply(&mut self, code: &str) -> bool {
        let accepted = code == "READY";
        self.accepted = accepted;
        self.required = !accepted;
        accepted || code == "SIM PIN"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_is_home_or_roaming() {
        assert!(Status::from(1).is_registered_status());
        assert!(Status::from(5).is_registered_status());
        for v in [0u8, 2, 3, 4, 6, 9] {
            assert!(!Status::from(v).is_registered_status());
        }
    }

    impl Status {
        fn is_registered_status(self) -> bool {
            let mut reg = RegistrationStatus::new();
            reg.set_status(self);
            reg.registered()
        }
    }

    #[test]
    fn reset_clears_registration() {
        let mut reg = RegistrationStatus::new();
        reg.set_status(Status::Roaming);
        assert!(reg.registered());
        reg.reset();
        assert!(!reg.registered());
    }

    #[test]
    fn pin_codes() {
        let mut pin = PinStatus::new();
        assert!(pin.apply("READY"));
        assert!(pin.accepted);
        assert!(!pin.required);

        assert!(pin.apply("SIM PIN"));
        assert!(!pin.accepted);
        assert!(pin.required);

        assert!(!pin.apply("SIM PUK"));
        assert!(pin.required);
    }
}
