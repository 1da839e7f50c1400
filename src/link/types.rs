//! Value types of the WiFi and link layer.

use heapless::String;

use crate::config::MAX_LINKS;
use crate::error::{Error, Result};

/// Length of a dotted IPv4 address plus terminator room.
pub type IpString = String<16>;
pub type MacString = String<18>;
pub type SsidString = String<33>;
/// Remote host of a link: a name or an address.
pub type HostString = String<64>;

/// WiFi operating mode (`AT+CWMODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WifiMode {
    Station = 1,
    SoftAp = 2,
    StationAp = 3,
}

impl WifiMode {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Station),
            2 => Some(Self::SoftAp),
            3 => Some(Self::StationAp),
            _ => None,
        }
    }
}

/// Access point encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Encryption {
    Open = 0,
    Wep = 1,
    WpaPsk = 2,
    Wpa2Psk = 3,
    WpaWpa2Psk = 4,
}

impl Encryption {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Wep,
            2 => Self::WpaPsk,
            3 => Self::Wpa2Psk,
            4 => Self::WpaWpa2Psk,
            _ => Self::Open,
        }
    }
}

/// Transport of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnType {
    Tcp,
    Udp,
    Ssl,
}

impl ConnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnType::Tcp => "TCP",
            ConnType::Udp => "UDP",
            ConnType::Ssl => "SSL",
        }
    }

    /// Parses the type field of `+CIPSTATUS`.
    pub fn parse(s: &[u8]) -> Option<Self> {
        match s {
            b"TCP" => Some(ConnType::Tcp),
            b"UDP" => Some(ConnType::Udp),
            b"SSL" => Some(ConnType::Ssl),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Client,
    Server,
}

/// Identifier of a multiplexed link, `0..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkId(u8);

impl LinkId {
    /// The link single-connection mode always uses.
    pub const SINGLE: LinkId = LinkId(0);

    /// A link id in `0..MAX_LINKS`, `InvalidParam` otherwise.
    pub fn new(id: u8) -> Result<Self> {
        if usize::from(id) < MAX_LINKS {
            Ok(Self(id))
        } else {
            Err(Error::InvalidParam)
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// An open link as tracked locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub kind: ConnType,
    pub role: Role,
    pub remote: HostString,
    pub remote_port: u16,
    pub local_port: u16,
}

/// Addresses of the station interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpInfo {
    pub ip: IpString,
    pub gateway: IpString,
    pub netmask: IpString,
}

/// An access point, either the associated one or a scan result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApInfo {
    pub ssid: SsidString,
    pub mac: MacString,
    pub channel: u8,
    pub rssi: i8,
    pub ecn: Encryption,
}

/// Data that arrived on a link, borrowed for the duration of one callback.
#[derive(Debug, Clone, Copy)]
pub struct RxData<'a> {
    pub link: LinkId,
    /// Length announced by the co-processor.
    pub len: usize,
    /// The bytes actually present, at most `len`.
    pub data: &'a [u8],
}

/// Copies `src` into a bounded string, cutting it at the capacity.
pub(crate) fn copy_str<const N: usize>(src: &[u8]) -> String<N> {
    let mut out = String::new();
    for c in crate::util::utf8_prefix(src).chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
