//! Unsolicited MQTT lines.

use crate::command::ConnMode;
use crate::link::urc as link_urc;
use crate::util;

use super::types::{Message, MqttState, QoS};

const SUBRECV: &[u8] = b"+MQTTSUBRECV:";
const CONNECTED: &[u8] = b"+MQTTCONNECTED:";
const DISCONNECTED: &[u8] = b"+MQTTDISCONNECTED:";

/// Broker session change announced in `bytes`, if any. The later marker
/// wins; message and `+IPD` payloads are not searched.
pub fn session_marker(bytes: &[u8], mode: ConnMode) -> Option<bool> {
    link_urc::last_marker(link_urc::event_lines(bytes, mode), CONNECTED, DISCONNECTED)
}

/// Length of the `+MQTTSUBRECV` frame at the start of `bytes`.
///
/// `None` if `bytes` does not start with one, `Some(None)` if its header is
/// malformed.
pub(crate) fn frame_len(bytes: &[u8]) -> Option<Option<usize>> {
    if !bytes.starts_with(SUBRECV) {
        return None;
    }
    Some(Messages::new(bytes).parse_at(SUBRECV.len()).map(|(_, end)| end))
}

/// Iterates over `+MQTTSUBRECV:<id>,"<topic>",<len>,<data>` lines.
///
/// The payload is taken by length, so it may contain line breaks, quotes
/// or anything else.
pub struct Messages<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> Messages<'a> {
    /// Starts at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    fn parse_at(&self, start: usize) -> Option<(Message<'a>, usize)> {
        let buf = self.buf;
        let mut c = start;
        util::read_uint(&mut c, buf).ok()?;
        util::expect_byte(&mut c, buf, b',').ok()?;
        let topic = util::read_quoted(&mut c, buf).ok()?;
        let topic = core::str::from_utf8(topic).ok()?;
        util::expect_byte(&mut c, buf, b',').ok()?;
        let len = util::read_uint(&mut c, buf).ok()? as usize;
        util::expect_byte(&mut c, buf, b',').ok()?;
        let end = c.saturating_add(len).min(buf.len());
        let msg = Message {
            topic,
            payload: &buf[c..end],
            len,
            qos: QoS::AtMostOnce,
            retain: false,
        };
        Some((msg, end))
    }
}

impl<'a> Iterator for Messages<'a> {
    type Item = Message<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let rest = self.buf.get(self.cursor..)?;
            let at = self.cursor + util::find(rest, SUBRECV)? + SUBRECV.len();
            match self.parse_at(at) {
                Some((msg, end)) => {
                    self.cursor = end;
                    return Some(msg);
                }
                None => {
                    warn!("malformed +MQTTSUBRECV line");
                    self.cursor = at;
                }
            }
        }
    }
}

/// Parses the state out of `+MQTTCONN:<id>,<state>,...`.
pub fn conn_state(bytes: &[u8]) -> Option<MqttState> {
    let line = util::prefixed_lines(bytes, b"+MQTTCONN:").next()?;
    let mut c = 0;
    util::read_uint(&mut c, line).ok()?;
    util::expect_byte(&mut c, line, b',').ok()?;
    MqttState::from_code(util::read_uint(&mut c, line).ok()?)
}
