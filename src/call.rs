/// Voice call state as reported in the `stat` field of `+CLCC:` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallState {
    Active = 0,
    Held = 1,
    Dialing = 2,
    Alerting = 3,
    Incoming = 4,
    Waiting = 5,
    #[default]
    Disconnected = 6,
}

impl From<u8> for CallState {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Active,
            1 => Self::Held,
            2 => Self::Dialing,
            3 => Self::Alerting,
            4 => Self::Incoming,
            5 => Self::Waiting,
            _ => Self::Disconnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_stat_maps_to_disconnected() {
        assert_eq!(CallState::from(4), CallState::Incoming);
        assert_eq!(CallState::from(6), CallState::Disconnected);
        assert_eq!(CallState::from(42), CallState::Disconnected);
    }
}
