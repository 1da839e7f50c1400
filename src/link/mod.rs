//! # WiFi and Link Manager
//!
//! [`EspAt`] is the context object of the driver. It owns the command engine,
//! the local view of the co-processor's state and the application's event
//! handler, and exposes the WiFi association and TCP/UDP/SSL link lifecycle
//! as `async` operations built from command engine exchanges.
//!
//! ```ignore
//! static BRIDGE: UartBridge = UartBridge::new();
//!
//! let mut esp = EspAt::new(uart, &BRIDGE, Config::default(), NoopEvents);
//! esp.initialize().await?;
//! esp.connect_ap("ssid", "password").await?;
//!
//! let link = esp.connect(ConnType::Tcp, "example.com", 80).await?;
//! esp.send(link, b"GET / HTTP/1.0\r\n\r\n").await?;
//!
//! loop {
//!     esp.process_tick()?;
//!     Timer::after_millis(10).await;
//! }
//! ```

pub mod table;
pub mod types;
pub mod urc;

use core::fmt::{self, Write as _};

use embassy_time::{Duration, Timer};
use heapless::{String, Vec};

use crate::command::{self, ConnMode};
use crate::config::{Config, TX_BUF_SIZE};
use crate::engine::CommandEngine;
use crate::error::{Error, Result};
use crate::events::{LinkEvents, NoopEvents};
use crate::matcher::{Expect, ResponseMatcher, SubstringMatcher};
use crate::transport::{Uart, UartBridge};
use crate::util;

use self::table::LinkTable;
use self::types::{
    ApInfo, ConnType, Encryption, IpInfo, Link, LinkId, MacString, Role, RxData, WifiMode,
    copy_str,
};

/// Longest payload one `AT+CIPSEND` accepts.
pub const MAX_SEND_LEN: usize = 2048;

/// Longest server timeout `AT+CIPSTO` accepts, in seconds.
pub const MAX_SERVER_TIMEOUT: u16 = 7200;

const JOIN: Expect<'static> = Expect::new(&["OK"], &["ERROR", "FAIL"]);
const OPEN: Expect<'static> = Expect::new(&["OK"], &["ERROR", "ALREADY", "FAIL"]);
const SENT: Expect<'static> = Expect::new(&["SEND OK"], &["SEND FAIL", "ERROR"]);

/// What the driver knows about the co-processor.
#[derive(Debug)]
pub struct LinkState {
    pub(crate) initialized: bool,
    pub(crate) wifi_connected: bool,
    pub(crate) wifi_mode: WifiMode,
    pub(crate) mode: ConnMode,
    pub(crate) transparent: bool,
    pub(crate) server_port: Option<u16>,
    pub(crate) ip: IpInfo,
    pub(crate) links: LinkTable,
}

impl LinkState {
    fn new() -> Self {
        Self {
            initialized: false,
            wifi_connected: false,
            wifi_mode: WifiMode::Station,
            mode: ConnMode::Single,
            transparent: false,
            server_port: None,
            ip: IpInfo::default(),
            links: LinkTable::new(),
        }
    }

    /// Forgets everything that does not survive a co-processor reset.
    fn reset(&mut self) {
        self.wifi_connected = false;
        self.mode = ConnMode::Single;
        self.transparent = false;
        self.server_port = None;
        self.ip = IpInfo::default();
        self.links.clear();
    }
}

/// Driver context for one ESP-AT co-processor.
pub struct EspAt<'b, U, H = NoopEvents, M = SubstringMatcher>
where
    U: Uart,
    H: LinkEvents,
    M: ResponseMatcher,
{
    pub(crate) engine: CommandEngine<'b, U, M>,
    pub(crate) state: LinkState,
    pub(crate) handler: H,
}

impl<'b, U: Uart, H: LinkEvents> EspAt<'b, U, H, SubstringMatcher> {
    /// Creates the driver. No bytes are exchanged until [`initialize`](Self::initialize).
    pub fn new(uart: U, bridge: &'b UartBridge, config: Config, handler: H) -> Self {
        Self::with_matcher(uart, bridge, config, handler, SubstringMatcher)
    }
}

impl<'b, U, H, M> EspAt<'b, U, H, M>
where
    U: Uart,
    H: LinkEvents,
    M: ResponseMatcher,
{
    pub fn with_matcher(
        uart: U,
        bridge: &'b UartBridge,
        config: Config,
        handler: H,
        matcher: M,
    ) -> Self {
        Self {
            engine: CommandEngine::with_matcher(uart, bridge, config, matcher),
            state: LinkState::new(),
            handler,
        }
    }

    fn config(&self) -> Config {
        *self.engine.config()
    }

    /// The command engine, for commands this driver has no method for.
    pub fn engine_mut(&mut self) -> &mut CommandEngine<'b, U, M> {
        &mut self.engine
    }

    /// The application event handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    /// Whether the station is associated, as last reported by the firmware.
    pub fn is_wifi_connected(&self) -> bool {
        self.state.wifi_connected
    }

    /// Whether the link is in transparent pass-through.
    pub fn is_transparent(&self) -> bool {
        self.state.transparent
    }

    pub fn conn_mode(&self) -> ConnMode {
        self.state.mode
    }

    /// Last known station addresses.
    pub fn ip(&self) -> &IpInfo {
        &self.state.ip
    }

    /// The links this driver believes are open.
    pub fn links(&self) -> &LinkTable {
        &self.state.links
    }

    /// Port of the running server, if one was started.
    pub fn server_port(&self) -> Option<u16> {
        self.state.server_port
    }

    /// Sends a command and waits for `OK`.
    async fn ok(&mut self, cmd: &str, timeout: Duration) -> Result<()> {
        self.engine.send_command(cmd, Some("OK"), timeout).await
    }

    async fn ok_default(&mut self, cmd: &str) -> Result<()> {
        let timeout = self.config().default_timeout;
        self.ok(cmd, timeout).await
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Arms the receiver and brings the co-processor into a known state:
    /// echo off, station mode.
    ///
    /// If the liveness check fails the co-processor may be stuck in
    /// transparent mode, so the escape sequence is sent and the check
    /// retried once before giving up with `NoResponse`.
    pub async fn initialize(&mut self) -> Result<()> {
        info!("initializing ESP-AT");
        let config = self.config();
        self.state = LinkState::new();
        self.engine.transport_mut().start_receive()?;
        Timer::after(config.boot_delay).await;

        if self.test().await.is_err() {
            warn!("no answer to AT, trying to leave transparent mode");
            let _ = self.exit_transparent().await;
            Timer::after_millis(500).await;
            if self.test().await.is_err() {
                error!("ESP-AT does not respond");
                return Err(Error::NoResponse);
            }
        }

        self.set_echo(false).await?;
        self.set_wifi_mode(WifiMode::Station).await?;
        self.state.initialized = true;
        info!("ESP-AT ready");
        Ok(())
    }

    /// Stops receiving and forgets all state.
    pub fn deinitialize(&mut self) -> Result<()> {
        self.state = LinkState::new();
        self.engine.transport_mut().stop_receive()
    }

    /// Restarts the co-processor (`AT+RST`) and waits for it to come back.
    pub async fn reset(&mut self) -> Result<()> {
        let config = self.config();
        self.engine
            .send_command(command::RESET, Some("ready"), config.long_timeout)
            .await?;
        Timer::after(config.reset_settle).await;
        self.state.reset();
        Ok(())
    }

    /// Restores factory settings (`AT+RESTORE`), which also restarts.
    pub async fn restore(&mut self) -> Result<()> {
        let config = self.config();
        self.engine
            .send_command(command::RESTORE, Some("ready"), config.long_timeout)
            .await?;
        Timer::after(config.reset_settle).await;
        self.state.reset();
        Ok(())
    }

    /// Liveness check.
    pub async fn test(&mut self) -> Result<()> {
        self.ok_default(command::TEST).await
    }

    /// Turns command echo on or off.
    pub async fn set_echo(&mut self, enable: bool) -> Result<()> {
        self.ok_default(&command::set_echo(enable)?).await
    }

    /// Firmware version information as printed by `AT+GMR`.
    pub async fn version(&mut self) -> Result<&str> {
        self.ok_default(command::VERSION).await?;
        let r = self.engine.response();
        let body = r.rfind("OK").map_or(r, |i| &r[..i]);
        Ok(body.trim())
    }

    // ---------------------------------------------------------------------
    // WiFi
    // ---------------------------------------------------------------------

    /// Selects station, soft-AP or both.
    pub async fn set_wifi_mode(&mut self, mode: WifiMode) -> Result<()> {
        self.ok_default(&command::set_wifi_mode(mode)?).await?;
        self.state.wifi_mode = mode;
        Ok(())
    }

    /// Reads the WiFi mode back from the firmware.
    pub async fn wifi_mode(&mut self) -> Result<WifiMode> {
        self.ok_default(command::QUERY_WIFI_MODE).await?;
        let buf = self.engine.response_bytes();
        let mode = util::prefixed_lines(buf, b"+CWMODE:")
            .next()
            .and_then(|line| util::read_uint(&mut 0, line).ok())
            .and_then(WifiMode::from_code)
            .ok_or(Error::ErrorResponse)?;
        self.state.wifi_mode = mode;
        Ok(mode)
    }

    /// Associates with an access point.
    ///
    /// An explicit `FAIL` from the firmware is `ConnectFail`; other failures
    /// (no answer, `ERROR`) are reported as the engine saw them.
    pub async fn connect_ap(&mut self, ssid: &str, password: &str) -> Result<()> {
        if ssid.is_empty() {
            return Err(Error::InvalidParam);
        }
        info!("joining {}", ssid);
        let config = self.config();
        let cmd = command::join_ap(ssid, password)?;
        match self.engine.exchange(&cmd, &JOIN, config.connect_timeout).await {
            Ok(_) => {
                self.state.wifi_connected = true;
                self.handler.on_wifi_connected();
                if config.refresh_ip_on_connect && self.ip_info().await.is_err() {
                    warn!("could not read station IP");
                }
                Ok(())
            }
            Err(e) => {
                self.state.wifi_connected = false;
                if self.engine.contains("FAIL") {
                    let reason = util::prefixed_lines(self.engine.response_bytes(), b"+CWJAP:")
                        .next()
                        .and_then(|line| util::read_uint(&mut 0, line).ok());
                    warn!("join refused, reason {:?}", reason);
                    return Err(Error::ConnectFail);
                }
                warn!("join failed: {:?}", e);
                Err(e)
            }
        }
    }

    /// Leaves the access point. Fires `on_wifi_disconnected` if the station was connected.
    pub async fn disconnect_ap(&mut self) -> Result<()> {
        self.ok_default(command::QUIT_AP).await?;
        self.state.ip = IpInfo::default();
        if self.state.wifi_connected {
            self.state.wifi_connected = false;
            self.handler.on_wifi_disconnected();
        }
        Ok(())
    }

    /// The access point the station is associated with, if any.
    pub async fn ap_info(&mut self) -> Result<Option<ApInfo>> {
        self.ok_default(command::QUERY_AP).await?;
        let line = match util::prefixed_lines(self.engine.response_bytes(), b"+CWJAP:").next() {
            Some(line) => line,
            None => return Ok(None),
        };
        let mut c = 0;
        let ssid = util::read_quoted(&mut c, line)?;
        util::expect_byte(&mut c, line, b',')?;
        let mac = util::read_quoted(&mut c, line)?;
        util::expect_byte(&mut c, line, b',')?;
        let channel = util::read_uint(&mut c, line)?;
        util::expect_byte(&mut c, line, b',')?;
        let rssi = util::read_int(&mut c, line)?;
        Ok(Some(ApInfo {
            ssid: copy_str(ssid),
            mac: copy_str(mac),
            channel: u8::try_from(channel).map_err(|_| Error::InvalidParam)?,
            rssi: i8::try_from(rssi).map_err(|_| Error::InvalidParam)?,
            ecn: Encryption::Open,
        }))
    }

    /// Scans for access points, keeping the first `N` results.
    pub async fn scan_ap<const N: usize>(&mut self) -> Result<Vec<ApInfo, N>> {
        let timeout = self.config().long_timeout;
        self.ok(command::LIST_AP, timeout).await?;
        let mut found = Vec::new();
        for line in util::prefixed_lines(self.engine.response_bytes(), b"+CWLAP:(") {
            match parse_scan_line(line) {
                Some(ap) => {
                    if found.push(ap).is_err() {
                        break;
                    }
                }
                None => warn!("unparsable scan line"),
            }
        }
        Ok(found)
    }

    /// Whether the firmware rejoins the stored access point on boot.
    pub async fn set_auto_connect(&mut self, enable: bool) -> Result<()> {
        self.ok_default(&command::set_auto_connect(enable)?).await
    }

    /// Configures the soft-AP.
    pub async fn setup_ap(
        &mut self,
        ssid: &str,
        password: &str,
        channel: u8,
        ecn: Encryption,
    ) -> Result<()> {
        if ssid.is_empty() {
            return Err(Error::InvalidParam);
        }
        self.ok_default(&command::setup_ap(ssid, password, channel, ecn)?)
            .await
    }

    /// Reads the station IP (`AT+CIFSR`) and caches it.
    pub async fn ip_info(&mut self) -> Result<&IpInfo> {
        self.ok_default(command::QUERY_IP).await?;
        let buf = self.engine.response_bytes();
        if let Some(line) = util::prefixed_lines(buf, b"+CIFSR:STAIP,").next() {
            let ip = util::read_quoted(&mut 0, line)?;
            self.state.ip.ip = copy_str(ip);
            debug!("station ip {}", self.state.ip.ip.as_str());
        }
        Ok(&self.state.ip)
    }

    /// Sets a static station address, optionally with gateway and netmask.
    pub async fn set_station_ip(&mut self, ip: &str, gateway_netmask: Option<(&str, &str)>) -> Result<()> {
        if ip.is_empty() {
            return Err(Error::InvalidParam);
        }
        self.ok_default(&command::set_ip(true, ip, gateway_netmask)?)
            .await?;
        self.state.ip.ip = copy_str(ip.as_bytes());
        if let Some((gateway, netmask)) = gateway_netmask {
            self.state.ip.gateway = copy_str(gateway.as_bytes());
            self.state.ip.netmask = copy_str(netmask.as_bytes());
        }
        Ok(())
    }

    /// Sets the soft-AP address, optionally with gateway and netmask.
    pub async fn set_ap_ip(&mut self, ip: &str, gateway_netmask: Option<(&str, &str)>) -> Result<()> {
        if ip.is_empty() {
            return Err(Error::InvalidParam);
        }
        self.ok_default(&command::set_ip(false, ip, gateway_netmask)?)
            .await
    }

    /// Enables or disables DHCP for the interfaces of `mode`.
    pub async fn enable_dhcp(&mut self, mode: WifiMode, enable: bool) -> Result<()> {
        self.ok_default(&command::set_dhcp(mode, enable)?).await
    }

    /// MAC address of the station (`station == true`) or soft-AP interface.
    pub async fn mac(&mut self, station: bool) -> Result<MacString> {
        let (cmd, prefix): (&str, &[u8]) = if station {
            (command::QUERY_STATION_MAC, b"+CIPSTAMAC:")
        } else {
            (command::QUERY_AP_MAC, b"+CIPAPMAC:")
        };
        self.ok_default(cmd).await?;
        let line = util::prefixed_lines(self.engine.response_bytes(), prefix)
            .next()
            .ok_or(Error::ErrorResponse)?;
        Ok(copy_str(util::read_quoted(&mut 0, line)?))
    }

    /// Overrides the station or soft-AP MAC address.
    pub async fn set_mac(&mut self, station: bool, mac: &str) -> Result<()> {
        if mac.is_empty() {
            return Err(Error::InvalidParam);
        }
        self.ok_default(&command::set_mac(station, mac)?).await
    }

    /// Pings `host` and returns the round trip in milliseconds.
    pub async fn ping(&mut self, host: &str) -> Result<u32> {
        if host.is_empty() {
            return Err(Error::InvalidParam);
        }
        let timeout = self.config().long_timeout;
        self.ok(&command::ping(host)?, timeout).await?;
        let buf = self.engine.response_bytes();
        let mut c = 0;
        util::skip_past(&mut c, buf, b"+")?;
        if buf[c..].starts_with(b"PING:") {
            c += 5;
        }
        util::read_uint(&mut c, buf).map_err(|_| Error::ErrorResponse)
    }

    // ---------------------------------------------------------------------
    // Links
    // ---------------------------------------------------------------------

    /// Switches between single and multiple connection mode.
    pub async fn set_multi_conn(&mut self, enable: bool) -> Result<()> {
        let mode = if enable { ConnMode::Multi } else { ConnMode::Single };
        self.ok_default(mode.select()).await?;
        self.state.mode = mode;
        Ok(())
    }

    /// Opens a link and returns its id.
    ///
    /// Single-connection mode always uses link 0; multi-connection mode
    /// takes the lowest free id.
    pub async fn connect(&mut self, kind: ConnType, host: &str, port: u16) -> Result<LinkId> {
        let id = match self.state.mode {
            ConnMode::Single => LinkId::SINGLE,
            ConnMode::Multi => self.state.links.free_id().ok_or(Error::BufferFull)?,
        };
        self.open(id, kind, host, port).await?;
        Ok(id)
    }

    /// Opens a link on an explicit id. Ids other than 0 need multi-connection mode.
    pub async fn connect_to(&mut self, id: LinkId, kind: ConnType, host: &str, port: u16) -> Result<()> {
        if !self.state.mode.is_multi() && id != LinkId::SINGLE {
            return Err(Error::InvalidParam);
        }
        self.open(id, kind, host, port).await
    }

    async fn open(&mut self, id: LinkId, kind: ConnType, host: &str, port: u16) -> Result<()> {
        if host.is_empty() {
            return Err(Error::InvalidParam);
        }
        debug!("opening {} link {} to {}:{}", kind.as_str(), id.get(), host, port);
        let timeout = self.config().connect_timeout;
        let cmd = self.state.mode.start(id, kind, host, port)?;
        let result = self.engine.exchange(&cmd, &OPEN, timeout).await;

        if self.engine.contains("ALREADY") {
            return Err(Error::AlreadyConnected);
        }
        match result {
            Ok(_) => {}
            Err(Error::Busy) => return Err(Error::Busy),
            Err(Error::Uart) => return Err(Error::Uart),
            Err(_) if self.engine.contains("CONNECT") => {}
            Err(e) => {
                warn!("link open failed: {:?}", e);
                return Err(Error::ConnectFail);
            }
        }

        self.state.links.insert(Link {
            id,
            kind,
            role: Role::Client,
            remote: copy_str(host.as_bytes()),
            remote_port: port,
            local_port: 0,
        });
        Ok(())
    }

    /// Closes a link and forgets it.
    pub async fn close(&mut self, id: LinkId) -> Result<()> {
        let cmd = self.state.mode.close(id)?;
        self.ok_default(&cmd).await?;
        self.state.links.remove(id);
        Ok(())
    }

    /// Closes every link.
    pub async fn close_all(&mut self) -> Result<()> {
        match self.state.mode {
            ConnMode::Multi => self.ok_default(command::CLOSE_ALL).await?,
            ConnMode::Single => {
                let cmd = ConnMode::Single.close(LinkId::SINGLE)?;
                self.ok_default(&cmd).await?
            }
        }
        self.state.links.clear();
        Ok(())
    }

    /// Rebuilds the link table from `AT+CIPSTATUS` and returns the number of
    /// open links.
    pub async fn refresh_links(&mut self) -> Result<usize> {
        self.ok_default(command::LINK_STATUS).await?;
        self.state.links.clear();
        for line in util::prefixed_lines(self.engine.response_bytes(), b"+CIPSTATUS:") {
            match parse_status_line(line) {
                Some(link) => self.state.links.insert(link),
                None => warn!("unparsable link status line"),
            }
        }
        Ok(self.state.links.len())
    }

    /// Starts a TCP server, switching to multi-connection mode first if needed.
    pub async fn start_server(&mut self, port: u16) -> Result<()> {
        if !self.state.mode.is_multi() {
            self.set_multi_conn(true).await?;
        }
        self.ok_default(&command::start_server(port)?).await?;
        self.state.server_port = Some(port);
        info!("server listening on {}", port);
        Ok(())
    }

    /// Stops the server and forgets its port.
    pub async fn stop_server(&mut self) -> Result<()> {
        self.ok_default(command::STOP_SERVER).await?;
        self.state.server_port = None;
        Ok(())
    }

    /// Sets the idle timeout of server links, clamped to 7200 s.
    pub async fn set_server_timeout(&mut self, seconds: u16) -> Result<()> {
        let seconds = seconds.min(MAX_SERVER_TIMEOUT);
        self.ok_default(&command::set_server_timeout(seconds)?).await
    }

    /// Sends `data` on a link.
    ///
    /// Two phases: `AT+CIPSEND` asks to stream `data.len()` bytes and waits
    /// for the `>` prompt, then the raw bytes go out and `SEND OK` is awaited.
    /// Any deviation is `SendFail`. In transparent mode the bytes are written
    /// straight through.
    pub async fn send(&mut self, id: LinkId, data: &[u8]) -> Result<()> {
        if data.is_empty() || data.len() > MAX_SEND_LEN {
            return Err(Error::InvalidParam);
        }
        if self.state.transparent {
            return self.transparent_send(data).await;
        }

        let timeout = self.config().default_timeout;
        let cmd = self.state.mode.send(id, data.len())?;
        if let Err(e) = self.engine.send_command(&cmd, Some(">"), timeout).await {
            warn!("no send prompt on link {}: {:?}", id.get(), e);
            return Err(Error::SendFail);
        }
        if let Err(e) = self.engine.send_raw(data).await {
            warn!("payload transmit failed: {:?}", e);
            return Err(Error::SendFail);
        }
        if let Err(e) = self.engine.wait_any(&SENT, timeout).await {
            warn!("send on link {} not confirmed: {:?}", id.get(), e);
            return Err(Error::SendFail);
        }
        trace!("sent {} bytes on link {}", data.len(), id.get());
        Ok(())
    }

    /// Sends text on a link.
    pub async fn send_str(&mut self, id: LinkId, s: &str) -> Result<()> {
        self.send(id, s.as_bytes()).await
    }

    /// Formats into a transmit-sized buffer and sends the result.
    pub async fn send_fmt(&mut self, id: LinkId, args: fmt::Arguments<'_>) -> Result<()> {
        let mut text: String<TX_BUF_SIZE> = String::new();
        text.write_fmt(args).map_err(|_| Error::InvalidParam)?;
        self.send(id, text.as_bytes()).await
    }

    /// Switches the open single link into transparent pass-through.
    pub async fn enter_transparent(&mut self) -> Result<()> {
        if self.state.mode.is_multi() {
            self.set_multi_conn(false).await?;
        }
        self.ok_default(command::TRANSPARENT_ON).await?;
        let timeout = self.config().default_timeout;
        self.engine
            .send_command(command::TRANSPARENT_SEND, Some(">"), timeout)
            .await?;
        self.state.transparent = true;
        info!("transparent mode on");
        Ok(())
    }

    /// Leaves transparent mode.
    ///
    /// The firmware only recognizes `+++` when the line has been silent for
    /// the guard time before and after it.
    pub async fn exit_transparent(&mut self) -> Result<()> {
        let guard = self.config().guard_time;
        Timer::after(guard).await;
        self.engine.send_raw(command::ESCAPE).await?;
        Timer::after(guard).await;
        self.state.transparent = false;
        self.ok_default(command::TRANSPARENT_OFF).await
    }

    /// Writes bytes straight through while in transparent mode.
    pub async fn transparent_send(&mut self, data: &[u8]) -> Result<()> {
        if !self.state.transparent {
            return Err(Error::NotConnected);
        }
        if data.is_empty() {
            return Err(Error::InvalidParam);
        }
        self.engine.send_raw(data).await
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    /// Dispatches what arrived since the last tick.
    ///
    /// Call this periodically from the main loop. Events stashed during
    /// exchanges are handled before the live buffer, which is cleared
    /// afterwards. Returns `Overrun` if received bytes were lost.
    pub fn process_tick(&mut self) -> Result<()> {
        let lost = self.engine.poll();

        if self.engine.has_stash() {
            let stash = self.engine.take_stash();
            urc::dispatch(&stash, &mut self.state, &mut self.handler);
        }

        let live = self.engine.unscanned();
        if self.state.transparent {
            if !live.is_empty() {
                self.handler.on_data_received(&RxData {
                    link: LinkId::SINGLE,
                    len: live.len(),
                    data: live,
                });
            }
        } else {
            urc::dispatch(live, &mut self.state, &mut self.handler);
        }
        self.engine.release();

        if lost {
            warn!("receive overrun");
            return Err(Error::Overrun);
        }
        Ok(())
    }
}

/// Parses the inside of `+CWLAP:(<ecn>,"<ssid>",<rssi>,"<mac>",<channel>,...)`.
fn parse_scan_line(line: &[u8]) -> Option<ApInfo> {
    let mut c = 0;
    let ecn = util::read_uint(&mut c, line).ok()?;
    util::expect_byte(&mut c, line, b',').ok()?;
    let ssid = util::read_quoted(&mut c, line).ok()?;
    util::expect_byte(&mut c, line, b',').ok()?;
    let rssi = util::read_int(&mut c, line).ok()?;
    util::expect_byte(&mut c, line, b',').ok()?;
    let mac = util::read_quoted(&mut c, line).ok()?;
    util::expect_byte(&mut c, line, b',').ok()?;
    let channel = util::read_uint(&mut c, line).ok()?;
    Some(ApInfo {
        ssid: copy_str(ssid),
        mac: copy_str(mac),
        channel: u8::try_from(channel).ok()?,
        rssi: i8::try_from(rssi).ok()?,
        ecn: Encryption::from_code(ecn),
    })
}

/// Parses `<id>,"<type>","<remote>",<remote port>,<local port>,<tetype>`.
fn parse_status_line(line: &[u8]) -> Option<Link> {
    let mut c = 0;
    let id = util::read_uint(&mut c, line).ok()?;
    util::expect_byte(&mut c, line, b',').ok()?;
    let kind = ConnType::parse(util::read_quoted(&mut c, line).ok()?)?;
    util::expect_byte(&mut c, line, b',').ok()?;
    let remote = util::read_quoted(&mut c, line).ok()?;
    util::expect_byte(&mut c, line, b',').ok()?;
    let remote_port = util::read_uint(&mut c, line).ok()?;
    util::expect_byte(&mut c, line, b',').ok()?;
    let local_port = util::read_uint(&mut c, line).ok()?;
    util::expect_byte(&mut c, line, b',').ok()?;
    let role = match util::read_uint(&mut c, line).ok()? {
        1 => Role::Server,
        _ => Role::Client,
    };
    Some(Link {
        id: LinkId::new(u8::try_from(id).ok()?).ok()?,
        kind,
        role,
        remote: copy_str(remote),
        remote_port: u16::try_from(remote_port).ok()?,
        local_port: u16::try_from(local_port).ok()?,
    })
}
