//! Example: a light switch driven over MQTT
//!
//! Joins WiFi, connects to a broker, subscribes to a command topic and
//! publishes the resulting state. The co-processor is replaced by
//! `HappyEsp`, a stand-in that answers every command the way ESP-AT
//! firmware does when everything goes well, so this runs on the host.
//!
//! On a board, `HappyEsp` is your HAL's UART with DMA: `start_transmit`
//! starts the DMA write, and the idle-line and transmit-complete interrupts
//! call `BRIDGE.on_rx_event` and `BRIDGE.on_tx_complete`.

use embassy_futures::block_on;
use embassy_time::Duration;
use embedded_io_async::{ErrorKind, ErrorType};
use myrtio_esp_at::{
    Config, EspAt, LinkEvents, Message, MqttClient, MqttConfig, MqttEvents, QoS, Uart, UartBridge,
};

const CMD_TOPIC: &str = "device/light/cmd";
const STATE_TOPIC: &str = "device/light/state";

static BRIDGE: UartBridge = UartBridge::new();

/// Answers each transmit with a canned reply, straight into the bridge.
struct HappyEsp;

impl ErrorType for HappyEsp {
    type Error = ErrorKind;
}

impl Uart for HappyEsp {
    fn start_transmit(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let reply: &[u8] = if bytes.starts_with(b"AT+CWJAP=") {
            b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n"
        } else if bytes.starts_with(b"AT+MQTTCONN=") {
            b"+MQTTCONNECTED:0,1,\"broker.local\",\"1883\",\"\",1\r\n\r\nOK\r\n"
        } else if bytes.starts_with(b"AT+MQTTPUBRAW=") {
            b"\r\nOK\r\n\r\n>"
        } else if bytes.starts_with(b"AT") {
            b"\r\nOK\r\n"
        } else {
            // Payload of a raw publish.
            b"\r\n+MQTTPUB:OK\r\n"
        };
        BRIDGE.on_rx_event(reply);
        BRIDGE.on_tx_complete();
        Ok(())
    }

    fn start_receive(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Light state, switched by messages on [`CMD_TOPIC`].
#[derive(Default)]
struct Light {
    on: bool,
    changed: bool,
}

impl LinkEvents for Light {
    fn on_wifi_connected(&mut self) {
        println!("wifi up");
    }
}

impl MqttEvents for Light {
    fn on_connected(&mut self) {
        println!("broker connected");
    }

    fn on_message(&mut self, msg: &Message<'_>) {
        if msg.topic != CMD_TOPIC {
            return;
        }
        let on = match msg.payload {
            b"ON" => true,
            b"OFF" => false,
            _ => return,
        };
        self.changed = self.on != on;
        self.on = on;
    }
}

fn main() {
    block_on(async {
        let config = Config {
            boot_delay: Duration::from_millis(0),
            refresh_ip_on_connect: false,
            ..Config::default()
        };
        let mut esp = EspAt::new(HappyEsp, &BRIDGE, config, Light::default());
        esp.initialize().await.expect("co-processor did not answer");
        esp.connect_ap("home", "secret").await.expect("join failed");

        let mut mqtt = MqttClient::new(esp, MqttConfig::default());
        mqtt.init().expect("driver not initialized");
        mqtt.connect_to_broker("broker.local", 1883, "light-1", "", "")
            .await
            .expect("broker refused");
        mqtt.subscribe(CMD_TOPIC, QoS::AtLeastOnce)
            .await
            .expect("subscribe failed");

        // What the receive interrupt delivers when someone flips the switch.
        BRIDGE.on_rx_event(b"+MQTTSUBRECV:0,\"device/light/cmd\",2,ON\r\n");
        mqtt.process_tick().expect("receive overrun");

        let light = mqtt.handler_mut();
        if core::mem::take(&mut light.changed) {
            let state = if light.on { "ON" } else { "OFF" };
            mqtt.publish(STATE_TOPIC, state, QoS::AtMostOnce, true)
                .await
                .expect("publish failed");
            println!("published {state} to {STATE_TOPIC}");
        }
    });
}
