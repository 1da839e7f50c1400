//! # MQTT Session Layer
//!
//! The co-processor firmware runs the MQTT protocol itself; this layer drives
//! it through the `AT+MQTT*` command family on the link id the firmware
//! reserves for MQTT, and keeps a local view of the session: configuration,
//! state, subscriptions and counters.
//!
//! The session state moves through
//! `NotInit → UserSet → ConnSet → {Disconnected ⇄ Connected → ConnNoSub ⇄ ConnWithSub}`,
//! driven by explicit operations and by the `+MQTTCONNECTED` /
//! `+MQTTDISCONNECTED` lines picked up in [`MqttClient::process_tick`].
//!
//! ```ignore
//! let mut mqtt = MqttClient::new(esp, MqttConfig::default());
//! mqtt.init()?;
//! mqtt.connect_to_broker("broker.local", 1883, "node-1", "", "").await?;
//! mqtt.subscribe("device/cmd", QoS::AtMostOnce).await?;
//!
//! loop {
//!     mqtt.process_tick()?;
//!     mqtt.publish("device/state", "online", QoS::AtMostOnce, false).await?;
//!     Timer::after_secs(30).await;
//! }
//! ```

pub mod command;
pub mod session;
pub mod subscriptions;
pub mod types;
pub mod urc;

use core::fmt::{self, Write as _};

use embassy_time::{Duration, Timer};
use heapless::String;

use crate::config::MqttConfig;
use crate::error::{Error, Result};
use crate::events::{LinkEvents, MqttEvents, NoopEvents};
use crate::link::{EspAt, urc as link_urc};
use crate::matcher::{Expect, ResponseMatcher, SubstringMatcher};
use crate::transport::Uart;

use self::session::MqttSession;
use self::subscriptions::Subscription;
use self::types::{
    BrokerConfig, ConnConfig, Counters, MAX_KEEP_ALIVE, MAX_MESSAGE_LEN, MAX_TOPIC_LEN, MqttState,
    QoS, Scheme, UserConfig, bounded,
};

/// Either acknowledgement ends a lenient publish.
const PUBLISHED: Expect<'static> = Expect::new(&["+MQTTPUB:OK", "OK"], &["ERROR", "FAIL"]);
/// Only the explicit acknowledgement ends a strict publish.
const PUBLISHED_STRICT: Expect<'static> = Expect::new(&["+MQTTPUB:OK"], &["+MQTTPUB:FAIL", "ERROR"]);

/// How a publish decides it went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ack {
    /// `+MQTTPUB:OK` or a bare `OK`; a timeout is `Timeout`.
    Lenient,
    /// `+MQTTPUB:OK` only; everything else is `PublishFail`.
    Strict,
}

/// MQTT client on top of an [`EspAt`] driver.
pub struct MqttClient<'b, U, H = NoopEvents, M = SubstringMatcher>
where
    U: Uart,
    H: LinkEvents + MqttEvents,
    M: ResponseMatcher,
{
    esp: EspAt<'b, U, H, M>,
    session: MqttSession,
    config: MqttConfig,
}

impl<'b, U, H, M> MqttClient<'b, U, H, M>
where
    U: Uart,
    H: LinkEvents + MqttEvents,
    M: ResponseMatcher,
{
    /// Wraps an initialized driver. Call [`init`](Self::init) before anything else.
    pub fn new(esp: EspAt<'b, U, H, M>, config: MqttConfig) -> Self {
        Self {
            esp,
            session: MqttSession::new(),
            config,
        }
    }

    /// The underlying driver, for WiFi and link operations.
    pub fn esp(&self) -> &EspAt<'b, U, H, M> {
        &self.esp
    }

    /// The underlying driver, for WiFi and link operations.
    pub fn esp_mut(&mut self) -> &mut EspAt<'b, U, H, M> {
        &mut self.esp
    }

    /// Gives the driver back, dropping the session.
    pub fn into_inner(self) -> EspAt<'b, U, H, M> {
        self.esp
    }

    /// The application event handler.
    pub fn handler_mut(&mut self) -> &mut H {
        self.esp.handler_mut()
    }

    pub fn session(&self) -> &MqttSession {
        &self.session
    }

    /// Current session state.
    pub fn state(&self) -> MqttState {
        self.session.state
    }

    pub fn is_connected(&self) -> bool {
        self.session.state.is_connected()
    }

    pub fn is_initialized(&self) -> bool {
        self.session.initialized
    }

    /// Published, received and reconnect counts.
    pub fn counters(&self) -> Counters {
        self.session.counters
    }

    /// Active subscriptions, oldest first.
    pub fn subscriptions(&self) -> &[Subscription] {
        self.session.subscriptions.as_slice()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.session.initialized {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        self.ensure_initialized()?;
        if self.session.state.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    async fn ok(&mut self, cmd: &str, timeout: Duration) -> Result<()> {
        self.esp
            .engine
            .send_command(cmd, Some("OK"), timeout)
            .await
    }

    // ---------------------------------------------------------------------
    // Lifecycle and configuration
    // ---------------------------------------------------------------------

    /// Resets the session to its defaults: TCP, keep-alive 120 s, clean
    /// session, port 1883, auto-reconnect.
    ///
    /// The driver must have been initialized first.
    pub fn init(&mut self) -> Result<()> {
        if !self.esp.is_initialized() {
            warn!("MQTT init before ESP-AT init");
            return Err(Error::NotInitialized);
        }
        self.session = MqttSession::new();
        self.session.initialized = true;
        info!("MQTT initialized");
        Ok(())
    }

    /// Disconnects if needed, cleans the firmware session and forgets everything.
    pub async fn deinit(&mut self) -> Result<()> {
        if self.session.state.is_connected() {
            let _ = self.disconnect().await;
        }
        let _ = self.clean().await;
        self.session = MqttSession::new();
        Ok(())
    }

    /// Pushes the client identity to the firmware and keeps it on success.
    pub async fn set_user_config(&mut self, user: UserConfig) -> Result<()> {
        self.ensure_initialized()?;
        let cmd = command::user_config(&user)?;
        let timeout = self.config.default_timeout;
        if let Err(e) = self.ok(&cmd, timeout).await {
            warn!("user config rejected: {:?}", e);
            return Err(e);
        }
        self.session.user = user;
        self.session.reach(MqttState::UserSet);
        Ok(())
    }

    /// Plain TCP identity with optional credentials (empty strings for none).
    pub async fn set_user_config_simple(
        &mut self,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> Result<()> {
        if client_id.is_empty() {
            return Err(Error::InvalidParam);
        }
        let user = UserConfig {
            scheme: Scheme::Tcp,
            client_id: bounded(client_id)?,
            username: bounded(username)?,
            password: bounded(password)?,
            ..UserConfig::default()
        };
        self.set_user_config(user).await
    }

    /// Pushes session options to the firmware and keeps them on success.
    pub async fn set_conn_config(&mut self, mut conn: ConnConfig) -> Result<()> {
        self.ensure_initialized()?;
        conn.keep_alive = conn.keep_alive.min(MAX_KEEP_ALIVE);
        let cmd = command::conn_config(&conn)?;
        let timeout = self.config.default_timeout;
        if let Err(e) = self.ok(&cmd, timeout).await {
            warn!("connection config rejected: {:?}", e);
            return Err(e);
        }
        self.session.conn = conn;
        self.session.reach(MqttState::ConnSet);
        Ok(())
    }

    /// Re-sends the stored session options once the identity has been set.
    async fn push_conn_config(&mut self) -> Result<()> {
        if self.session.state < MqttState::UserSet {
            return Ok(());
        }
        let cmd = command::conn_config(&self.session.conn)?;
        let timeout = self.config.default_timeout;
        self.ok(&cmd, timeout).await?;
        self.session.reach(MqttState::ConnSet);
        Ok(())
    }

    /// Sets the keep-alive interval, clamped to 7200 s.
    pub async fn set_keep_alive(&mut self, seconds: u16) -> Result<()> {
        self.session.conn.keep_alive = seconds.min(MAX_KEEP_ALIVE);
        self.push_conn_config().await
    }

    /// Sets the last will.
    pub async fn set_lwt(&mut self, topic: &str, message: &str, qos: QoS, retain: bool) -> Result<()> {
        self.session.conn.lwt_topic = bounded(topic)?;
        self.session.conn.lwt_message = bounded(message)?;
        self.session.conn.lwt_qos = qos;
        self.session.conn.lwt_retain = retain;
        self.push_conn_config().await
    }

    /// Stores the broker to connect to. Nothing is sent until [`connect`](Self::connect).
    pub fn set_broker_config(&mut self, broker: BrokerConfig) -> Result<()> {
        if broker.host.is_empty() {
            return Err(Error::InvalidParam);
        }
        self.session.broker = broker;
        Ok(())
    }

    /// Stores host, port and the firmware auto-reconnect flag.
    pub fn set_broker(&mut self, host: &str, port: u16, reconnect: bool) -> Result<()> {
        self.set_broker_config(BrokerConfig {
            host: bounded(host)?,
            port,
            reconnect,
        })
    }

    // ---------------------------------------------------------------------
    // Connection
    // ---------------------------------------------------------------------

    /// Connects to the configured broker.
    ///
    /// On failure the session is `Disconnected`, `on_error(ConnectFail)` fires
    /// and `ConnectFail` is returned.
    pub async fn connect(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.session.broker.host.is_empty() {
            return Err(Error::InvalidParam);
        }
        if self.session.state < MqttState::UserSet {
            warn!("connecting without a user config");
        }
        if !self.esp.is_wifi_connected() {
            if self.config.require_wifi {
                return Err(Error::WifiNotConnected);
            }
            warn!("connecting while wifi is reported down");
        }

        info!(
            "connecting to {}:{}",
            self.session.broker.host.as_str(),
            self.session.broker.port
        );
        let cmd = command::connect(&self.session.broker)?;
        let timeout = self.config.connect_timeout;
        match self.ok(&cmd, timeout).await {
            Ok(()) => {
                self.session.enter(MqttState::ConnNoSub);
                info!("broker connected");
                self.esp.handler.on_connected();
                Ok(())
            }
            Err(e) => {
                warn!("broker connect failed: {:?}", e);
                self.session.enter(MqttState::Disconnected);
                self.esp.handler.on_error(Error::ConnectFail);
                Err(Error::ConnectFail)
            }
        }
    }

    /// User config, broker and connect in one call. Auto-reconnect is enabled.
    pub async fn connect_to_broker(
        &mut self,
        host: &str,
        port: u16,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> Result<()> {
        self.set_user_config_simple(client_id, username, password)
            .await?;
        self.set_broker(host, port, true)?;
        self.connect().await
    }

    /// Closes the broker session. Subscriptions are dropped even if the
    /// firmware rejects the command.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let timeout = self.config.default_timeout;
        let result = self.ok(command::CLEAN, timeout).await;
        self.session.enter(MqttState::Disconnected);
        info!("broker disconnected");
        self.esp.handler.on_disconnected();
        result
    }

    /// Releases the firmware's MQTT resources. The session goes back to `NotInit`.
    pub async fn clean(&mut self) -> Result<()> {
        let timeout = self.config.default_timeout;
        let result = self.ok(command::CLEAN, timeout).await;
        self.session.enter(MqttState::NotInit);
        result
    }

    /// Best-effort recovery: clean, wait, resend the identity, connect.
    ///
    /// Subscriptions are not restored; re-subscribe from `on_connected`.
    pub async fn reconnect(&mut self) -> Result<()> {
        info!("reconnecting to broker");
        self.session.counters.reconnects = self.session.counters.reconnects.wrapping_add(1);
        let _ = self.clean().await;
        Timer::after(self.config.reconnect_delay).await;
        let user = self.session.user.clone();
        self.set_user_config(user).await?;
        self.connect().await
    }

    /// Asks the firmware for the session state and adopts it.
    pub async fn query_connection(&mut self) -> Result<MqttState> {
        let timeout = self.config.default_timeout;
        self.ok(command::QUERY_CONN, timeout).await?;
        match urc::conn_state(self.esp.engine.response_bytes()) {
            Some(state) => {
                if state != self.session.state {
                    debug!("session state {:?} -> {:?}", self.session.state, state);
                }
                self.session.enter(state);
            }
            None => warn!("no +MQTTCONN line in reply"),
        }
        Ok(self.session.state)
    }

    // ---------------------------------------------------------------------
    // Subscriptions
    // ---------------------------------------------------------------------

    /// Subscribes to `topic`. Subscribing again updates the QoS in place.
    pub async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<()> {
        self.ensure_connected()?;
        if topic.is_empty() || topic.len() > MAX_TOPIC_LEN {
            return Err(Error::InvalidParam);
        }
        if !self.session.subscriptions.has_room_for(topic) {
            return Err(Error::BufferFull);
        }

        debug!("subscribing to {}", topic);
        let cmd = command::subscribe(topic, qos)?;
        let timeout = self.config.subscribe_timeout;
        if let Err(e) = self.ok(&cmd, timeout).await {
            warn!("subscribe to {} failed: {:?}", topic, e);
            return Err(Error::SubscribeFail);
        }
        self.session.subscriptions.upsert(topic, qos)?;
        self.session.state = MqttState::ConnWithSub;
        self.esp.handler.on_subscribed(topic);
        Ok(())
    }

    /// Subscribes to each topic in turn, stopping at the first failure.
    pub async fn subscribe_multiple(&mut self, topics: &[(&str, QoS)]) -> Result<()> {
        if topics.is_empty() {
            return Err(Error::InvalidParam);
        }
        for (i, (topic, qos)) in topics.iter().enumerate() {
            if i > 0 {
                Timer::after(self.config.bulk_spacing).await;
            }
            self.subscribe(topic, *qos).await?;
        }
        Ok(())
    }

    /// Unsubscribes from `topic`. A topic that is not subscribed is left
    /// alone and reported as success.
    pub async fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        self.ensure_connected()?;
        if topic.is_empty() {
            return Err(Error::InvalidParam);
        }
        if !self.session.subscriptions.contains(topic) {
            return Ok(());
        }

        let cmd = command::unsubscribe(topic)?;
        let timeout = self.config.default_timeout;
        if let Err(e) = self.ok(&cmd, timeout).await {
            warn!("unsubscribe from {} failed: {:?}", topic, e);
            return Err(Error::SubscribeFail);
        }
        self.session.subscriptions.remove(topic);
        if self.session.subscriptions.is_empty() && self.session.state == MqttState::ConnWithSub {
            self.session.state = MqttState::ConnNoSub;
        }
        self.esp.handler.on_unsubscribed(topic);
        Ok(())
    }

    /// Unsubscribes every topic, stopping at the first failure.
    pub async fn unsubscribe_all(&mut self) -> Result<()> {
        let mut first = true;
        loop {
            let Some(topic) = self.session.subscriptions.iter().next().map(|s| s.topic.clone())
            else {
                break;
            };
            if !first {
                Timer::after(self.config.bulk_spacing).await;
            }
            first = false;
            self.unsubscribe(&topic).await?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Publishing
    // ---------------------------------------------------------------------

    /// Publishes a text message.
    ///
    /// Uses the length-prefixed raw publish, so the message needs no
    /// escaping. Either `+MQTTPUB:OK` or `OK` confirms it.
    pub async fn publish(&mut self, topic: &str, message: &str, qos: QoS, retain: bool) -> Result<()> {
        self.publish_with(topic, message.as_bytes(), qos, retain, Ack::Lenient)
            .await
    }

    /// Publishes binary data: short payloads take the [`publish`](Self::publish)
    /// path, long ones [`publish_raw`](Self::publish_raw).
    pub async fn publish_data(&mut self, topic: &str, data: &[u8], qos: QoS, retain: bool) -> Result<()> {
        let ack = if data.len() < MAX_MESSAGE_LEN {
            Ack::Lenient
        } else {
            Ack::Strict
        };
        self.publish_with(topic, data, qos, retain, ack).await
    }

    /// Publishes binary data and requires the explicit `+MQTTPUB:OK`.
    pub async fn publish_raw(&mut self, topic: &str, data: &[u8], qos: QoS, retain: bool) -> Result<()> {
        self.publish_with(topic, data, qos, retain, Ack::Strict)
            .await
    }

    /// Formats the message into a bounded buffer and publishes it.
    pub async fn publish_fmt(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
        args: fmt::Arguments<'_>,
    ) -> Result<()> {
        let mut message: String<MAX_MESSAGE_LEN> = String::new();
        message.write_fmt(args).map_err(|_| Error::InvalidParam)?;
        self.publish(topic, &message, qos, retain).await
    }

    async fn publish_with(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        ack: Ack,
    ) -> Result<()> {
        self.ensure_connected()?;
        if topic.is_empty() || topic.len() > MAX_TOPIC_LEN || payload.is_empty() {
            return Err(Error::InvalidParam);
        }

        debug!("publishing {} bytes to {}", payload.len(), topic);
        let cmd = command::publish_raw(topic, payload.len(), qos, retain)?;
        let timeout = self.config.default_timeout;
        let engine = &mut self.esp.engine;
        if let Err(e) = engine.send_command(&cmd, Some(">"), timeout).await {
            warn!("no publish prompt: {:?}", e);
            return Err(Error::PublishFail);
        }
        if let Err(e) = engine.send_raw(payload).await {
            warn!("publish payload transmit failed: {:?}", e);
            return Err(Error::PublishFail);
        }

        let timeout = self.config.publish_timeout;
        let result = match ack {
            Ack::Lenient => engine.wait_any(&PUBLISHED, timeout).await,
            Ack::Strict => engine.wait_any(&PUBLISHED_STRICT, timeout).await,
        };
        match result {
            Ok(_) => {}
            Err(Error::Timeout) if ack == Ack::Lenient => {
                warn!("publish to {} not confirmed in time", topic);
                return Err(Error::Timeout);
            }
            Err(e) => {
                warn!("publish to {} failed: {:?}", topic, e);
                return Err(Error::PublishFail);
            }
        }

        self.session.counters.published = self.session.counters.published.wrapping_add(1);
        self.esp.handler.on_publish_complete(topic);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    /// Dispatches what arrived since the last tick: first the data stashed
    /// during exchanges, then the live buffer. Link events and MQTT events
    /// are both handled. Returns `Overrun` if received bytes were lost.
    pub fn process_tick(&mut self) -> Result<()> {
        if self.esp.is_transparent() {
            return self.esp.process_tick();
        }

        let lost = self.esp.engine.poll();
        let mode = self.esp.state.mode;

        if self.esp.engine.has_stash() {
            let stash = self.esp.engine.take_stash();
            session::dispatch(&stash, mode, &mut self.session, &mut self.esp.handler);
            link_urc::dispatch(&stash, &mut self.esp.state, &mut self.esp.handler);
        }

        let live = self.esp.engine.unscanned();
        session::dispatch(live, mode, &mut self.session, &mut self.esp.handler);
        link_urc::dispatch(live, &mut self.esp.state, &mut self.esp.handler);
        self.esp.engine.release();

        if lost {
            warn!("receive overrun");
            return Err(Error::Overrun);
        }
        Ok(())
    }

    /// Parses `+MQTTSUBRECV` lines out of externally supplied bytes and
    /// delivers them. Returns the number of messages delivered.
    pub fn process_message(&mut self, data: &[u8]) -> usize {
        let mut delivered = 0;
        for msg in urc::Messages::new(data) {
            self.session.counters.received = self.session.counters.received.wrapping_add(1);
            self.esp.handler.on_message(&msg);
            delivered += 1;
        }
        delivered
    }
}
