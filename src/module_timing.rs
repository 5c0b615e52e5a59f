use embassy_time::Duration;

/// Warm-up window after boot during which periodic health checks stay silent
pub fn boot_grace_time() -> Duration {
    Duration::from_secs(10)
}

/// High time of the power key pulse used to power-cycle the module
pub fn power_pulse_time() -> Duration {
    Duration::from_secs(1)
}

/// Minimum spacing between `AT+CLCC` polls while a call is in progress
pub fn call_poll_interval() -> Duration {
    Duration::from_millis(500)
}

/// How long to wait in `ModemWait` for the unsolicited ready marker before
/// giving up and returning to `Idle`
pub fn modem_init_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Link idle time after which a lightweight flush is forced to keep the
/// channel sane
pub fn idle_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Time after a transmit with no inbound byte ever seen before the module is
/// considered unresponsive
pub fn rx_timeout() -> Duration {
    Duration::from_secs(5)
}
