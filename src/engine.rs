//! # Command Engine
//!
//! Serialized request/response exchanges over the asynchronous transport.
//!
//! An exchange clears the receive buffer, transmits a command line and then
//! suspends until the matcher recognizes the bytes received so far, or until
//! the deadline passes. Exactly zero or one exchange is pending at any time;
//! `&mut self` on every operation is what enforces that.
//!
//! Unsolicited lines can arrive at any moment, including in the middle of an
//! exchange. Before the buffer is recycled the engine moves anything the
//! dispatcher has not looked at yet into a stash, which the next processing
//! tick drains before it inspects the live buffer.

use core::fmt::{self, Write as _};

use embassy_time::{Duration, Instant};
use heapless::{String, Vec};

use crate::buffer::ReceiveBuffer;
use crate::config::{CMD_BUF_SIZE, Config};
use crate::error::{Error, Result};
use crate::matcher::{Expect, Outcome, ResponseMatcher, SubstringMatcher};
use crate::transport::{Transport, Uart, UartBridge};
use crate::util;

/// Capacity of the unsolicited-data stash.
pub const STASH_SIZE: usize = 1536;

/// Markers of unsolicited lines the dispatcher acts on.
const EVENT_MARKERS: &[&[u8]] = &[
    b"+IPD,",
    b"+MQTT",
    b"WIFI ",
    b",CONNECT",
    b",CLOSED",
];

/// Markers of unsolicited lines that carry data and must survive an exchange.
const DATA_MARKERS: &[&[u8]] = &[b"+MQTTSUBRECV:", b"+IPD,"];

/// The exchange currently waiting for its answer.
#[derive(Debug, Clone)]
pub struct PendingExchange {
    pub expected: String<32>,
    pub deadline: Instant,
}

/// Issues one AT command at a time and classifies the answer.
pub struct CommandEngine<'b, U: Uart, M: ResponseMatcher = SubstringMatcher> {
    transport: Transport<'b, U>,
    matcher: M,
    config: Config,
    pending: Option<PendingExchange>,
    stash: Vec<u8, STASH_SIZE>,
}

impl<'b, U: Uart> CommandEngine<'b, U, SubstringMatcher> {
    /// Creates an engine with the default matcher.
    pub fn new(uart: U, bridge: &'b UartBridge, config: Config) -> Self {
        Self::with_matcher(uart, bridge, config, SubstringMatcher)
    }
}

impl<'b, U: Uart, M: ResponseMatcher> CommandEngine<'b, U, M> {
    /// Creates an engine that classifies responses with `matcher`.
    pub fn with_matcher(uart: U, bridge: &'b UartBridge, config: Config, matcher: M) -> Self {
        Self {
            transport: Transport::new(uart, bridge, config),
            matcher,
            config,
            pending: None,
            stash: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sends one command line and waits for `expected`.
    ///
    /// With `expected == None` the command is fire-and-forget: the call
    /// returns as soon as the transmit completes. A missing `\r\n` is added.
    pub async fn send_command(
        &mut self,
        cmd: &str,
        expected: Option<&str>,
        timeout: Duration,
    ) -> Result<()> {
        if cmd.trim_end().is_empty() {
            return Err(Error::InvalidParam);
        }
        debug!("AT> {}", cmd.trim_end());

        self.begin();
        if cmd.ends_with("\r\n") {
            self.transport.send(cmd.as_bytes()).await?;
        } else {
            let mut line: String<CMD_BUF_SIZE> = String::new();
            line.push_str(cmd).map_err(|_| Error::InvalidParam)?;
            line.push_str("\r\n").map_err(|_| Error::InvalidParam)?;
            self.transport.send(line.as_bytes()).await?;
        }

        match expected {
            None => {
                self.finish();
                Ok(())
            }
            Some(token) => {
                let tokens = [token];
                self.wait_any(&Expect::any(&tokens), timeout).await.map(|_| ())
            }
        }
    }

    /// Formats a command into a bounded scratch buffer and sends it.
    ///
    /// A command that does not fit the scratch buffer is `InvalidParam`.
    pub async fn send_command_fmt(
        &mut self,
        expected: Option<&str>,
        timeout: Duration,
        args: fmt::Arguments<'_>,
    ) -> Result<()> {
        let mut line: String<CMD_BUF_SIZE> = String::new();
        line.write_fmt(args).map_err(|_| Error::InvalidParam)?;
        self.send_command(&line, expected, timeout).await
    }

    /// Sends a command and waits for any of the tokens in `expect`.
    ///
    /// Returns the index of the success token that matched.
    pub async fn exchange(
        &mut self,
        cmd: &str,
        expect: &Expect<'_>,
        timeout: Duration,
    ) -> Result<usize> {
        self.send_command(cmd, None, timeout).await?;
        self.wait_any(expect, timeout).await
    }

    /// Waits for `token` in what has been received since the last clear.
    pub async fn wait_for(&mut self, token: &str, timeout: Duration) -> Result<()> {
        let tokens = [token];
        self.wait_any(&Expect::any(&tokens), timeout).await.map(|_| ())
    }

    /// Waits until the matcher decides on the received bytes.
    ///
    /// The deadline is `now + timeout`; once it has passed without a verdict
    /// the result is `Timeout`, or `Overrun` if the buffer filled up.
    pub async fn wait_any(&mut self, expect: &Expect<'_>, timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut expected = String::new();
        if let Some(first) = expect.success.first() {
            for c in first.chars() {
                if expected.push(c).is_err() {
                    break;
                }
            }
        }
        self.pending = Some(PendingExchange { expected, deadline });

        let result = loop {
            self.transport.pump();
            match self
                .matcher
                .classify(self.transport.buffer().as_bytes(), expect)
            {
                Some(Outcome::Matched(i)) => break Ok(i),
                Some(Outcome::Failed) => break Err(Error::ErrorResponse),
                Some(Outcome::Busy) => break Err(Error::Busy),
                None => {}
            }
            if Instant::now() >= deadline {
                break Err(if self.transport.buffer().is_full() {
                    Error::Overrun
                } else {
                    Error::Timeout
                });
            }
            self.transport.receive_until(deadline).await;
        };

        match &result {
            Ok(_) => trace!("AT< {}", self.transport.buffer().as_str()),
            Err(e) => debug!("exchange ended with {:?}: {}", e, self.transport.buffer().as_str()),
        }
        self.finish();
        result
    }

    /// Transmits raw bytes, bypassing token matching.
    ///
    /// Used for the payload phase of two-phase sends, where the payload may
    /// contain anything.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.begin();
        self.transport.send(bytes).await
    }

    /// The exchange being waited on, if any.
    pub fn pending(&self) -> Option<&PendingExchange> {
        self.pending.as_ref()
    }

    /// The response of the last exchange.
    pub fn response(&self) -> &str {
        self.transport.buffer().as_str()
    }

    /// The response of the last exchange as bytes.
    pub fn response_bytes(&self) -> &[u8] {
        self.transport.buffer().as_bytes()
    }

    /// Whether the last response contains `token`.
    pub fn contains(&self, token: &str) -> bool {
        self.transport.buffer().contains(token)
    }

    pub fn buffer(&self) -> &ReceiveBuffer {
        self.transport.buffer()
    }

    pub fn transport_mut(&mut self) -> &mut Transport<'b, U> {
        &mut self.transport
    }

    /// Pulls in whatever arrived since the last call, without waiting.
    ///
    /// Returns `true` if bytes were lost since the previous poll.
    pub fn poll(&mut self) -> bool {
        self.transport.pump();
        self.transport.take_overrun()
    }

    /// Bytes the dispatcher has not looked at yet.
    pub fn unscanned(&self) -> &[u8] {
        self.transport.buffer().unscanned()
    }

    /// Drops the live buffer once the dispatcher is done with it.
    pub fn release(&mut self) {
        self.transport.clear();
    }

    pub fn has_stash(&self) -> bool {
        !self.stash.is_empty()
    }

    /// Takes the stashed unsolicited data, leaving the stash empty.
    pub fn take_stash(&mut self) -> Vec<u8, STASH_SIZE> {
        core::mem::take(&mut self.stash)
    }

    /// Starts a new exchange: pulls in pending bytes, stashes any events
    /// nobody has seen yet and clears the buffer.
    fn begin(&mut self) {
        self.transport.pump();
        let unseen = self.transport.buffer().unscanned();
        if EVENT_MARKERS.iter().any(|m| util::contains(unseen, m)) {
            stash_bytes(&mut self.stash, unseen);
        }
        self.transport.clear();
    }

    /// Ends an exchange: data-bearing lines that arrived with the response
    /// are stashed, the rest is marked as seen.
    fn finish(&mut self) {
        self.pending = None;
        let unseen = self.transport.buffer().unscanned();
        if let Some(start) = DATA_MARKERS.iter().filter_map(|m| util::find(unseen, m)).min() {
            stash_bytes(&mut self.stash, &unseen[start..]);
        }
        self.transport.buffer_mut().mark_scanned();
    }
}

fn stash_bytes(stash: &mut Vec<u8, STASH_SIZE>, bytes: &[u8]) {
    let room = stash.capacity() - stash.len();
    if bytes.len() > room {
        warn!("stash full, dropping {} bytes", bytes.len() - room);
    }
    let _ = stash.extend_from_slice(&bytes[..bytes.len().min(room)]);
}
