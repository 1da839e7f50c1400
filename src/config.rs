//! Driver configuration and capacity constants.

use embassy_time::Duration;

/// Capacity of the receive buffer handed to the engine, terminator included.
pub const RX_BUF_SIZE: usize = 2048;

/// Capacity of the single transmit slot. Larger payloads go out in chunks.
pub const TX_BUF_SIZE: usize = 1024;

/// Capacity of the scratch buffer formatted commands are composed in.
pub const CMD_BUF_SIZE: usize = 256;

/// Number of multiplexed links the co-processor supports.
pub const MAX_LINKS: usize = 5;

/// Timings of the command engine and the link manager.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Timeout of ordinary exchanges.
    pub default_timeout: Duration,
    /// Timeout of slow exchanges (reset, scan, ping, link open).
    pub long_timeout: Duration,
    /// Timeout of WiFi association.
    pub connect_timeout: Duration,
    /// Ceiling on a single UART transmit.
    pub tx_timeout: Duration,
    /// How long a transmit waits for the previous one before giving up with `Busy`.
    pub tx_busy_wait: Duration,
    /// Silence kept before and after the `+++` escape sequence.
    pub guard_time: Duration,
    /// Delay between arming the receiver and the first liveness check.
    pub boot_delay: Duration,
    /// Delay after `AT+RST` reports `ready`.
    pub reset_settle: Duration,
    /// Query the station IP after a successful association.
    pub refresh_ip_on_connect: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(3000),
            long_timeout: Duration::from_millis(10_000),
            connect_timeout: Duration::from_millis(15_000),
            tx_timeout: Duration::from_millis(5000),
            tx_busy_wait: Duration::from_millis(1000),
            guard_time: Duration::from_millis(1000),
            boot_delay: Duration::from_millis(1000),
            reset_settle: Duration::from_millis(2000),
            refresh_ip_on_connect: true,
        }
    }
}

/// Timings and policies of the MQTT session.
#[derive(Debug, Clone, Copy)]
pub struct MqttConfig {
    pub connect_timeout: Duration,
    pub publish_timeout: Duration,
    pub subscribe_timeout: Duration,
    pub default_timeout: Duration,
    /// Pause between cleaning the session and reconnecting.
    pub reconnect_delay: Duration,
    /// Pause between commands of a bulk subscribe or unsubscribe.
    pub bulk_spacing: Duration,
    /// Refuse `connect` with `WifiNotConnected` while WiFi is known to be down.
    pub require_wifi: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(10_000),
            publish_timeout: Duration::from_millis(5000),
            subscribe_timeout: Duration::from_millis(5000),
            default_timeout: Duration::from_millis(3000),
            reconnect_delay: Duration::from_millis(1000),
            bulk_spacing: Duration::from_millis(100),
            require_wifi: false,
        }
    }
}
