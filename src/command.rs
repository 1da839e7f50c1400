//! # AT Command Builders
//!
//! Every command line the driver sends is composed here, so the wire shapes
//! live in one place. Builders return a bounded [`Command`] and fail with
//! `InvalidParam` when the line would not fit.
//!
//! The command shapes that depend on the connection mode (opening, sending
//! on and closing a link) hang off [`ConnMode`].

use core::fmt::{self, Write as _};

use heapless::String;

use crate::config::CMD_BUF_SIZE;
use crate::error::{Error, Result};
use crate::link::types::{ConnType, Encryption, LinkId, WifiMode};

/// One command line, `\r\n` included.
pub type Command = String<CMD_BUF_SIZE>;

pub const TEST: &str = "AT\r\n";
pub const RESET: &str = "AT+RST\r\n";
pub const RESTORE: &str = "AT+RESTORE\r\n";
pub const VERSION: &str = "AT+GMR\r\n";
pub const QUERY_WIFI_MODE: &str = "AT+CWMODE?\r\n";
pub const QUIT_AP: &str = "AT+CWQAP\r\n";
pub const QUERY_AP: &str = "AT+CWJAP?\r\n";
pub const LIST_AP: &str = "AT+CWLAP\r\n";
pub const QUERY_IP: &str = "AT+CIFSR\r\n";
pub const QUERY_STATION_MAC: &str = "AT+CIPSTAMAC?\r\n";
pub const QUERY_AP_MAC: &str = "AT+CIPAPMAC?\r\n";
pub const LINK_STATUS: &str = "AT+CIPSTATUS\r\n";
pub const CLOSE_ALL: &str = "AT+CIPCLOSE=5\r\n";
pub const STOP_SERVER: &str = "AT+CIPSERVER=0\r\n";
pub const TRANSPARENT_ON: &str = "AT+CIPMODE=1\r\n";
pub const TRANSPARENT_OFF: &str = "AT+CIPMODE=0\r\n";
pub const TRANSPARENT_SEND: &str = "AT+CIPSEND\r\n";
/// Escape sequence leaving transparent mode. Sent without a line ending.
pub const ESCAPE: &[u8] = b"+++";

/// Formats into a fresh command buffer.
pub fn build(args: fmt::Arguments<'_>) -> Result<Command> {
    let mut cmd = Command::new();
    cmd.write_fmt(args).map_err(|_| Error::InvalidParam)?;
    Ok(cmd)
}

/// A string parameter escaped for the AT firmware: `\`, `"` and `,` get a
/// leading backslash.
#[derive(Debug, Clone, Copy)]
pub struct Escaped<'a>(pub &'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            if matches!(c, '\\' | '"' | ',') {
                f.write_char('\\')?;
            }
            f.write_char(c)?;
        }
        Ok(())
    }
}

fn flag(enable: bool) -> u8 {
    u8::from(enable)
}

/// `ATE0` / `ATE1`.
pub fn set_echo(enable: bool) -> Result<Command> {
    build(format_args!("ATE{}\r\n", flag(enable)))
}

/// `AT+CWMODE=<mode>`.
pub fn set_wifi_mode(mode: WifiMode) -> Result<Command> {
    build(format_args!("AT+CWMODE={}\r\n", mode as u8))
}

/// Joins an access point. SSID and password are escaped.
pub fn join_ap(ssid: &str, password: &str) -> Result<Command> {
    build(format_args!(
        "AT+CWJAP=\"{}\",\"{}\"\r\n",
        Escaped(ssid),
        Escaped(password)
    ))
}

pub fn set_auto_connect(enable: bool) -> Result<Command> {
    build(format_args!("AT+CWAUTOCONN={}\r\n", flag(enable)))
}

/// Configures the soft-AP.
pub fn setup_ap(ssid: &str, password: &str, channel: u8, ecn: Encryption) -> Result<Command> {
    build(format_args!(
        "AT+CWSAP=\"{}\",\"{}\",{},{}\r\n",
        Escaped(ssid),
        Escaped(password),
        channel,
        ecn as u8
    ))
}

/// `AT+CIPSTA` for the station, `AT+CIPAP` for the soft-AP.
pub fn set_ip(
    station: bool,
    ip: &str,
    gateway_netmask: Option<(&str, &str)>,
) -> Result<Command> {
    let name = if station { "AT+CIPSTA" } else { "AT+CIPAP" };
    match gateway_netmask {
        Some((gateway, netmask)) => build(format_args!(
            "{}=\"{}\",\"{}\",\"{}\"\r\n",
            name, ip, gateway, netmask
        )),
        None => build(format_args!("{}=\"{}\"\r\n", name, ip)),
    }
}

pub fn set_dhcp(mode: WifiMode, enable: bool) -> Result<Command> {
    build(format_args!("AT+CWDHCP={},{}\r\n", mode as u8, flag(enable)))
}

pub fn set_mac(station: bool, mac: &str) -> Result<Command> {
    let name = if station { "AT+CIPSTAMAC" } else { "AT+CIPAPMAC" };
    build(format_args!("{}=\"{}\"\r\n", name, mac))
}

pub fn ping(host: &str) -> Result<Command> {
    build(format_args!("AT+PING=\"{}\"\r\n", Escaped(host)))
}

/// `AT+CIPSERVER=1,<port>`.
pub fn start_server(port: u16) -> Result<Command> {
    build(format_args!("AT+CIPSERVER=1,{}\r\n", port))
}

/// Server inactivity timeout; the caller clamps `seconds`.
pub fn set_server_timeout(seconds: u16) -> Result<Command> {
    build(format_args!("AT+CIPSTO={}\r\n", seconds))
}

/// Single or multiple connection mode (`AT+CIPMUX`).
///
/// Link-addressed commands differ between the two: single mode omits the
/// link id everywhere and implicitly uses link 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnMode {
    #[default]
    Single,
    Multi,
}

impl ConnMode {
    /// Whether link ids appear on the wire.
    pub fn is_multi(self) -> bool {
        self == ConnMode::Multi
    }

    /// The `AT+CIPMUX` line selecting this mode.
    pub fn select(self) -> &'static str {
        match self {
            ConnMode::Single => "AT+CIPMUX=0\r\n",
            ConnMode::Multi => "AT+CIPMUX=1\r\n",
        }
    }

    /// Opens a link. The id is only written in multi-connection mode.
    pub fn start(self, id: LinkId, kind: ConnType, host: &str, port: u16) -> Result<Command> {
        match self {
            ConnMode::Single => build(format_args!(
                "AT+CIPSTART=\"{}\",\"{}\",{}\r\n",
                kind.as_str(),
                Escaped(host),
                port
            )),
            ConnMode::Multi => build(format_args!(
                "AT+CIPSTART={},\"{}\",\"{}\",{}\r\n",
                id.get(),
                kind.as_str(),
                Escaped(host),
                port
            )),
        }
    }

    /// Announces a payload of `len` bytes on a link.
    pub fn send(self, id: LinkId, len: usize) -> Result<Command> {
        match self {
            ConnMode::Single => build(format_args!("AT+CIPSEND={}\r\n", len)),
            ConnMode::Multi => build(format_args!("AT+CIPSEND={},{}\r\n", id.get(), len)),
        }
    }

    /// Closes a link.
    pub fn close(self, id: LinkId) -> Result<Command> {
        match self {
            ConnMode::Single => build(format_args!("AT+CIPCLOSE\r\n")),
            ConnMode::Multi => build(format_args!("AT+CIPCLOSE={}\r\n", id.get())),
        }
    }
}
