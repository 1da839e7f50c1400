//! Unsolicited link-layer lines and their dispatch.

use crate::command::ConnMode;
use crate::events::LinkEvents;
use crate::mqtt::urc as mqtt_urc;
use crate::util;

use super::LinkState;
use super::types::{ConnType, Link, LinkId, RxData, Role};

const WIFI_UP: &[u8] = b"WIFI CONNECTED";
const WIFI_DOWN: &[u8] = b"WIFI DISCONNECT";
const IPD: &[u8] = b"+IPD,";

/// WiFi state announced in `bytes`, if any.
///
/// When both markers are present the later one wins. Frame payloads are not
/// searched.
pub fn wifi_marker(bytes: &[u8], mode: ConnMode) -> Option<bool> {
    last_marker(event_lines(bytes, mode), WIFI_UP, WIFI_DOWN)
}

/// Which of `up` and `down` occurs last across `lines`.
pub(crate) fn last_marker<'a>(
    lines: impl Iterator<Item = &'a [u8]>,
    up: &[u8],
    down: &[u8],
) -> Option<bool> {
    let mut last = None;
    for line in lines {
        match (util::rfind(line, up), util::rfind(line, down)) {
            (Some(u), Some(d)) => last = Some(u > d),
            (Some(_), None) => last = Some(true),
            (None, Some(_)) => last = Some(false),
            (None, None) => {}
        }
    }
    last
}

/// Iterates over the lines of a buffer that are not frame payloads.
///
/// `+IPD` and `+MQTTSUBRECV` frames are stepped over by their declared
/// length, so nothing inside a payload reads as an event line. A frame
/// header that does not parse is skipped up to the end of its line.
pub fn event_lines(bytes: &[u8], mode: ConnMode) -> impl Iterator<Item = &[u8]> + '_ {
    let mut cursor = 0;
    core::iter::from_fn(move || {
        while cursor < bytes.len() {
            let start = cursor;
            let line = util::line_at(bytes, start);
            if let Some(len) = frame_len(&bytes[start..], mode) {
                cursor = start + len.unwrap_or(line.len()).max(1);
                continue;
            }
            cursor = start + line.len().max(1);
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    })
}

/// Length of the data frame at the start of `bytes`, payload included.
///
/// `None` if no frame starts here, `Some(None)` if the header is malformed.
fn frame_len(bytes: &[u8], mode: ConnMode) -> Option<Option<usize>> {
    if bytes.starts_with(IPD) {
        let frames = IpdFrames::new(bytes, mode);
        return Some(frames.parse_at(IPD.len()).map(|(_, end)| end));
    }
    mqtt_urc::frame_len(bytes)
}

/// Iterates over the `+IPD` frames in a buffer.
///
/// Multi-connection frames read `+IPD,<id>,<len>:<data>`, single-connection
/// frames `+IPD,<len>:<data>`. Extra fields before the colon are skipped.
/// A frame whose data was cut off yields the bytes that are present.
pub struct IpdFrames<'a> {
    buf: &'a [u8],
    cursor: usize,
    mode: ConnMode,
}

impl<'a> IpdFrames<'a> {
    /// Frames are parsed according to the connection mode `mode`.
    pub fn new(buf: &'a [u8], mode: ConnMode) -> Self {
        Self {
            buf,
            cursor: 0,
            mode,
        }
    }

    fn parse_at(&self, start: usize) -> Option<(RxData<'a>, usize)> {
        let buf = self.buf;
        let mut cursor = start;
        let link = match self.mode {
            ConnMode::Multi => {
                let id = util::read_uint(&mut cursor, buf).ok()?;
                util::expect_byte(&mut cursor, buf, b',').ok()?;
                LinkId::new(u8::try_from(id).ok()?).ok()?
            }
            ConnMode::Single => LinkId::SINGLE,
        };
        let len = util::read_uint(&mut cursor, buf).ok()? as usize;
        util::skip_past(&mut cursor, buf, b":").ok()?;
        let end = cursor.saturating_add(len).min(buf.len());
        let data = &buf[cursor..end];
        Some((RxData { link, len, data }, end))
    }
}

impl<'a> Iterator for IpdFrames<'a> {
    type Item = RxData<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let rest = self.buf.get(self.cursor..)?;
            let at = self.cursor + util::find(rest, IPD)? + IPD.len();
            match self.parse_at(at) {
                Some((frame, end)) => {
                    self.cursor = end;
                    return Some(frame);
                }
                None => {
                    warn!("malformed +IPD frame");
                    self.cursor = at;
                }
            }
        }
    }
}

/// A server-side link change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientLine {
    Connected(LinkId),
    Closed(LinkId),
}

/// Parses a `<id>,CONNECT` or `<id>,CLOSED` line.
pub fn client_line(line: &[u8]) -> Option<ClientLine> {
    let (id, rest) = match line {
        [d, b',', rest @ ..] if d.is_ascii_digit() => (LinkId::new(d - b'0').ok()?, rest),
        _ => return None,
    };
    match rest {
        b"CONNECT" => Some(ClientLine::Connected(id)),
        b"CLOSED" => Some(ClientLine::Closed(id)),
        _ => None,
    }
}

/// Iterates over the client lines of a buffer, skipping frame payloads.
pub fn client_lines(bytes: &[u8], mode: ConnMode) -> impl Iterator<Item = ClientLine> + '_ {
    event_lines(bytes, mode).filter_map(client_line)
}

/// Applies the link-layer events found in `bytes` to the state and fires the
/// matching callbacks, at most once per WiFi transition.
pub fn dispatch<H: LinkEvents>(bytes: &[u8], state: &mut LinkState, handler: &mut H) {
    if bytes.is_empty() {
        return;
    }

    match wifi_marker(bytes, state.mode) {
        Some(true) if !state.wifi_connected => {
            info!("wifi connected");
            state.wifi_connected = true;
            handler.on_wifi_connected();
        }
        Some(false) if state.wifi_connected => {
            info!("wifi disconnected");
            state.wifi_connected = false;
            state.ip = Default::default();
            handler.on_wifi_disconnected();
        }
        _ => {}
    }

    for event in client_lines(bytes, state.mode) {
        match event {
            ClientLine::Connected(id) => {
                if state.mode.is_multi() {
                    state.links.insert(Link {
                        id,
                        kind: ConnType::Tcp,
                        role: Role::Server,
                        remote: Default::default(),
                        remote_port: 0,
                        local_port: state.server_port.unwrap_or(0),
                    });
                }
                debug!("link {} opened by peer", id.get());
                handler.on_client_connected(id);
            }
            ClientLine::Closed(id) => {
                state.links.remove(id);
                debug!("link {} closed", id.get());
                handler.on_client_disconnected(id);
            }
        }
    }

    for frame in IpdFrames::new(bytes, state.mode) {
        trace!("+IPD link {} len {}", frame.link.get(), frame.len);
        handler.on_data_received(&frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_wifi_marker_wins() {
        let single = ConnMode::Single;
        assert_eq!(wifi_marker(b"WIFI DISCONNECT\r\nWIFI CONNECTED\r\n", single), Some(true));
        assert_eq!(wifi_marker(b"WIFI CONNECTED\r\nWIFI DISCONNECT\r\n", single), Some(false));
        assert_eq!(wifi_marker(b"WIFI GOT IP\r\n", single), None);
    }

    #[test]
    fn wifi_marker_inside_payload_is_ignored() {
        let ipd = b"WIFI CONNECTED\r\n+IPD,0,17:WIFI DISCONNECT\r\n\r\n";
        assert_eq!(wifi_marker(ipd, ConnMode::Multi), Some(true));

        let msg = b"+MQTTSUBRECV:0,\"cmd\",15,WIFI DISCONNECT\r\n";
        assert_eq!(wifi_marker(msg, ConnMode::Single), None);

        let after = b"+IPD,4:ping\r\nWIFI DISCONNECT\r\n";
        assert_eq!(wifi_marker(after, ConnMode::Single), Some(false));
    }

    #[test]
    fn huge_declared_length_is_clamped_to_buffer() {
        let frame = IpdFrames::new(b"+IPD,0,4294967295:ab", ConnMode::Multi)
            .next()
            .unwrap();
        assert_eq!(frame.len, u32::MAX as usize);
        assert_eq!(frame.data, b"ab");
    }

    #[test]
    fn parses_frames_in_both_modes() {
        let multi = b"\r\n+IPD,2,5:hello\r\n+IPD,0,3:abc";
        let frames: heapless::Vec<_, 4> = IpdFrames::new(multi, ConnMode::Multi).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].link.get(), 2);
        assert_eq!(frames[0].data, b"hello");
        assert_eq!(frames[1].data, b"abc");

        let single = b"+IPD,4:ping";
        let frame = IpdFrames::new(single, ConnMode::Single).next().unwrap();
        assert_eq!(frame.link, LinkId::SINGLE);
        assert_eq!((frame.len, frame.data), (4, &b"ping"[..]));
    }

    #[test]
    fn truncated_frame_keeps_present_bytes() {
        let frame = IpdFrames::new(b"+IPD,0,10:abc", ConnMode::Multi).next().unwrap();
        assert_eq!(frame.len, 10);
        assert_eq!(frame.data, b"abc");
    }

    #[test]
    fn payload_that_looks_like_a_client_line_is_skipped() {
        let buf = b"1,CONNECT\r\n+IPD,1,9:0,CLOSED\n\r\n1,CLOSED\r\n";
        let events: heapless::Vec<_, 4> = client_lines(buf, ConnMode::Multi).collect();
        let id = LinkId::new(1).unwrap();
        assert_eq!(&events[..], &[ClientLine::Connected(id), ClientLine::Closed(id)]);
    }

    #[test]
    fn ignores_connect_failures() {
        assert_eq!(client_line(b"0,CONNECT FAIL"), None);
        assert_eq!(client_line(b"7,CLOSED"), None);
    }
}
