//! MQTT value types: configuration, session state, messages.

use heapless::String;

use crate::util;

/// Link id the firmware reserves for MQTT.
pub const MQTT_LINK_ID: u8 = 0;

pub const MAX_CLIENT_ID_LEN: usize = 64;
pub const MAX_USERNAME_LEN: usize = 64;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MAX_PATH_LEN: usize = 64;
pub const MAX_TOPIC_LEN: usize = 128;
pub const MAX_MESSAGE_LEN: usize = 1024;
pub const MAX_HOST_LEN: usize = 128;
pub const MAX_SUBSCRIPTIONS: usize = 8;

/// Longest keep-alive the firmware accepts, in seconds.
pub const MAX_KEEP_ALIVE: u16 = 7200;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

/// Transport the firmware uses to reach the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Scheme {
    #[default]
    Tcp = 1,
    TlsNoCert = 2,
    TlsVerifyServer = 3,
    TlsProvideClient = 4,
    TlsMutual = 5,
    WebSocket = 6,
    WebSocketTls = 7,
}

/// Session state, in the order the firmware reports it for `AT+MQTTCONN?`.
///
/// `UserSet` and `ConnSet` are configuration checkpoints. Everything from
/// `Connected` up means the broker session is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MqttState {
    #[default]
    NotInit = 0,
    UserSet = 1,
    ConnSet = 2,
    Disconnected = 3,
    Connected = 4,
    ConnNoSub = 5,
    ConnWithSub = 6,
}

impl MqttState {
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => MqttState::NotInit,
            1 => MqttState::UserSet,
            2 => MqttState::ConnSet,
            3 => MqttState::Disconnected,
            4 => MqttState::Connected,
            5 => MqttState::ConnNoSub,
            6 => MqttState::ConnWithSub,
            _ => return None,
        })
    }

    /// True for `Connected`, `ConnNoSub` and `ConnWithSub`.
    pub fn is_connected(self) -> bool {
        self >= MqttState::Connected
    }
}

/// Client identity (`AT+MQTTUSERCFG`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserConfig {
    pub scheme: Scheme,
    pub client_id: String<MAX_CLIENT_ID_LEN>,
    pub username: String<MAX_USERNAME_LEN>,
    pub password: String<MAX_PASSWORD_LEN>,
    pub cert_key_id: u8,
    pub ca_id: u8,
    /// WebSocket path.
    pub path: String<MAX_PATH_LEN>,
}

/// Session options (`AT+MQTTCONNCFG`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnConfig {
    pub keep_alive: u16,
    pub disable_clean_session: bool,
    pub lwt_topic: String<MAX_TOPIC_LEN>,
    pub lwt_message: String<MAX_MESSAGE_LEN>,
    pub lwt_qos: QoS,
    pub lwt_retain: bool,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            keep_alive: 120,
            disable_clean_session: false,
            lwt_topic: String::new(),
            lwt_message: String::new(),
            lwt_qos: QoS::AtMostOnce,
            lwt_retain: false,
        }
    }
}

/// Broker address (`AT+MQTTCONN`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String<MAX_HOST_LEN>,
    pub port: u16,
    /// Let the firmware reconnect on its own after losing the broker.
    pub reconnect: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            reconnect: true,
        }
    }
}

/// An incoming publish, borrowed from the receive buffer for one callback.
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    /// Length announced by the firmware. `payload` may be shorter if the
    /// message did not fit the buffer.
    pub len: usize,
    /// The firmware does not report these; they are always `AtMostOnce`
    /// and `false`.
    pub qos: QoS,
    pub retain: bool,
}

impl<'a> Message<'a> {
    /// The payload as text, up to the first invalid UTF-8 byte.
    pub fn payload_str(&self) -> &'a str {
        util::utf8_prefix(self.payload)
    }
}

/// Traffic counters of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Counters {
    pub published: u32,
    pub received: u32,
    pub reconnects: u32,
}

/// Copies `src` into a bounded string, failing if it does not fit.
pub(crate) fn bounded<const N: usize>(src: &str) -> crate::error::Result<String<N>> {
    src.try_into().map_err(|_| crate::error::Error::InvalidParam)
}
