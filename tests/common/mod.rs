//! Scripted co-processor used by the integration tests.
//!
//! The mock answers transmitted command lines with canned replies pushed
//! through the real [`UartBridge`], the same way the receive interrupt would.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use embassy_time::Duration;
use embedded_io_async::{ErrorKind, ErrorType};
use myrtio_esp_at::{
    Config, EspAt, LinkEvents, LinkId, Message, MqttConfig, MqttEvents, RxData, Uart, UartBridge,
};

#[derive(Default)]
pub struct Script {
    rules: Vec<(Vec<u8>, Vec<u8>)>,
    sent: Vec<Vec<u8>>,
}

impl Script {
    /// Everything transmitted so far, as text.
    pub fn sent(&self) -> Vec<String> {
        self.sent
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }

    pub fn was_sent(&self, prefix: &str) -> bool {
        self.sent.iter().any(|b| b.starts_with(prefix.as_bytes()))
    }

    /// Rules not consumed by a transmit yet.
    pub fn pending_rules(&self) -> usize {
        self.rules.len()
    }
}

/// Shared handle to the script, kept by the test after the UART moves into the driver.
#[derive(Clone, Default)]
pub struct Handle(Rc<RefCell<Script>>);

impl Handle {
    /// Answers the next transmit starting with `prefix` with `reply`.
    ///
    /// Rules are consumed once, oldest first.
    pub fn on(&self, prefix: &str, reply: &str) -> &Self {
        self.on_bytes(prefix.as_bytes(), reply.as_bytes())
    }

    pub fn on_bytes(&self, prefix: &[u8], reply: &[u8]) -> &Self {
        self.0
            .borrow_mut()
            .rules
            .push((prefix.to_vec(), reply.to_vec()));
        self
    }

    pub fn script(&self) -> std::cell::Ref<'_, Script> {
        self.0.borrow()
    }
}

pub struct ScriptedUart {
    bridge: &'static UartBridge,
    script: Handle,
    pub receiving: bool,
    /// When false, transmits start but never report completion.
    pub complete_tx: bool,
}

impl ScriptedUart {
    pub fn bridge(&self) -> &'static UartBridge {
        self.bridge
    }
}

impl ErrorType for ScriptedUart {
    type Error = ErrorKind;
}

impl Uart for ScriptedUart {
    fn start_transmit(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let reply = {
            let mut script = self.script.0.borrow_mut();
            script.sent.push(bytes.to_vec());
            let hit = script
                .rules
                .iter()
                .position(|(prefix, _)| bytes.starts_with(prefix));
            hit.map(|i| script.rules.remove(i).1)
        };
        if let Some(reply) = reply {
            self.bridge.on_rx_event(&reply);
        }
        if self.complete_tx {
            self.bridge.on_tx_complete();
        }
        Ok(())
    }

    fn start_receive(&mut self) -> Result<(), Self::Error> {
        self.receiving = true;
        Ok(())
    }

    fn stop_receive(&mut self) -> Result<(), Self::Error> {
        self.receiving = false;
        Ok(())
    }
}

/// A fresh bridge and a UART wired to it.
pub fn scripted() -> (&'static UartBridge, ScriptedUart, Handle) {
    let bridge: &'static UartBridge = Box::leak(Box::new(UartBridge::new()));
    let script = Handle::default();
    let uart = ScriptedUart {
        bridge,
        script: script.clone(),
        receiving: false,
        complete_tx: true,
    };
    (bridge, uart, script)
}

/// Timings short enough that failing exchanges end quickly.
pub fn fast_config() -> Config {
    Config {
        default_timeout: Duration::from_millis(60),
        long_timeout: Duration::from_millis(120),
        connect_timeout: Duration::from_millis(120),
        tx_timeout: Duration::from_millis(60),
        tx_busy_wait: Duration::from_millis(20),
        guard_time: Duration::from_millis(1),
        boot_delay: Duration::from_millis(0),
        reset_settle: Duration::from_millis(1),
        refresh_ip_on_connect: false,
    }
}

pub fn fast_mqtt_config() -> MqttConfig {
    MqttConfig {
        connect_timeout: Duration::from_millis(120),
        publish_timeout: Duration::from_millis(60),
        subscribe_timeout: Duration::from_millis(60),
        default_timeout: Duration::from_millis(60),
        reconnect_delay: Duration::from_millis(1),
        bulk_spacing: Duration::from_millis(1),
        require_wifi: false,
    }
}

/// Counts every callback and keeps copies of what was delivered.
#[derive(Debug, Default)]
pub struct Recorder {
    pub wifi_up: usize,
    pub wifi_down: usize,
    pub clients_up: Vec<u8>,
    pub clients_down: Vec<u8>,
    pub data: Vec<(u8, Vec<u8>)>,
    pub connected: usize,
    pub disconnected: usize,
    pub messages: Vec<(String, Vec<u8>, usize)>,
    pub published: Vec<String>,
    pub subscribed: Vec<String>,
    pub unsubscribed: Vec<String>,
    pub errors: Vec<myrtio_esp_at::Error>,
}

impl LinkEvents for Recorder {
    fn on_data_received(&mut self, data: &RxData<'_>) {
        self.data.push((data.link.get(), data.data.to_vec()));
    }

    fn on_wifi_connected(&mut self) {
        self.wifi_up += 1;
    }

    fn on_wifi_disconnected(&mut self) {
        self.wifi_down += 1;
    }

    fn on_client_connected(&mut self, link: LinkId) {
        self.clients_up.push(link.get());
    }

    fn on_client_disconnected(&mut self, link: LinkId) {
        self.clients_down.push(link.get());
    }
}

impl MqttEvents for Recorder {
    fn on_connected(&mut self) {
        self.connected += 1;
    }

    fn on_disconnected(&mut self) {
        self.disconnected += 1;
    }

    fn on_message(&mut self, msg: &Message<'_>) {
        self.messages
            .push((msg.topic.to_string(), msg.payload.to_vec(), msg.len));
    }

    fn on_publish_complete(&mut self, topic: &str) {
        self.published.push(topic.to_string());
    }

    fn on_subscribed(&mut self, topic: &str) {
        self.subscribed.push(topic.to_string());
    }

    fn on_unsubscribed(&mut self, topic: &str) {
        self.unsubscribed.push(topic.to_string());
    }

    fn on_error(&mut self, error: myrtio_esp_at::Error) {
        self.errors.push(error);
    }
}

/// Scripts the three exchanges of `EspAt::initialize`.
pub fn script_init(script: &Handle) {
    script
        .on("AT\r\n", "AT\r\n\r\nOK\r\n")
        .on("ATE0", "ATE0\r\n\r\nOK\r\n")
        .on("AT+CWMODE=1", "\r\nOK\r\n");
}

/// An initialized driver with a recording handler.
pub async fn ready_driver() -> (EspAt<'static, ScriptedUart, Recorder>, Handle) {
    let (bridge, uart, script) = scripted();
    script_init(&script);
    let mut esp = EspAt::new(uart, bridge, fast_config(), Recorder::default());
    esp.initialize().await.unwrap();
    (esp, script)
}
