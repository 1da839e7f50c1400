//! # Error Types
//!
//! A single error enum covers the whole stack, from the UART transfer up to
//! the MQTT session. Every operation reports its failure synchronously through
//! `Result<T, Error>`; nothing is retried behind the caller's back.

use core::fmt;

/// The error enum shared by the transport, the command engine, the link
/// manager and the MQTT session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The deadline elapsed before the expected token appeared, or a transmit
    /// did not complete within the transmit ceiling.
    Timeout,
    /// A transmit was still in flight, or the co-processor answered `busy`.
    Busy,
    /// The co-processor answered `ERROR` (or another failure token) without
    /// the expected token.
    ErrorResponse,
    /// The co-processor did not answer the liveness check.
    NoResponse,
    /// A parameter was empty, too long or out of range.
    InvalidParam,
    /// A WiFi association, link open or broker connect was refused.
    ConnectFail,
    /// A two-phase send deviated from the `>` / `SEND OK` sequence.
    SendFail,
    /// The link is already open.
    AlreadyConnected,
    /// The link or the broker session is not connected.
    NotConnected,
    /// The MQTT layer (or the driver below it) has not been initialized.
    NotInitialized,
    /// The broker refused a subscribe or unsubscribe.
    SubscribeFail,
    /// The broker refused a publish.
    PublishFail,
    /// A fixed-capacity table (links, subscriptions) is full.
    BufferFull,
    /// WiFi is not associated.
    WifiNotConnected,
    /// The receive path lost bytes: the DMA or the handoff pipe overran.
    Overrun,
    /// The UART peripheral rejected a transfer.
    Uart,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::Timeout => "timed out waiting for the co-processor",
            Error::Busy => "co-processor or transmitter busy",
            Error::ErrorResponse => "co-processor answered ERROR",
            Error::NoResponse => "co-processor does not respond",
            Error::InvalidParam => "invalid parameter",
            Error::ConnectFail => "connect failed",
            Error::SendFail => "send failed",
            Error::AlreadyConnected => "already connected",
            Error::NotConnected => "not connected",
            Error::NotInitialized => "not initialized",
            Error::SubscribeFail => "subscribe failed",
            Error::PublishFail => "publish failed",
            Error::BufferFull => "buffer full",
            Error::WifiNotConnected => "wifi not connected",
            Error::Overrun => "receive overrun",
            Error::Uart => "uart transfer rejected",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
