//! # Async Driver for ESP-AT WiFi Co-processors
//!
//! `myrtio-esp-at` drives an ESP8266/ESP32 running the Espressif AT firmware
//! over a UART, on top of the [Embassy](https://embassy.dev/) async ecosystem.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** All buffers are fixed-size, managed with `heapless`.
//! - **Idle-line receive:** The UART interrupt pushes received chunks into a
//!   lock-free [`UartBridge`]; the driver drains it at its own pace.
//! - **Command engine:** One command/response exchange at a time, matched
//!   against expected and failure tokens with timeouts and busy handling.
//! - **WiFi and links:** Station/AP management, up to 5 TCP/UDP/SSL links,
//!   a TCP server, `+IPD` data delivery and transparent pass-through.
//! - **MQTT:** The firmware's built-in MQTT client, with a local view of the
//!   session state, subscriptions and counters.
//!
//! ## Architecture
//!
//! ```text
//!  UART ISR ──► UartBridge ──► Transport ──► CommandEngine ──► EspAt ──► MqttClient
//!                                  ▲               │              │            │
//!                                  └── Uart trait  └── stash      └─ LinkEvents└─ MqttEvents
//! ```
//!
//! The application owns a static [`UartBridge`] and feeds it from its
//! interrupt handlers. Everything else runs in one task.
//!
//! ```ignore
//! static BRIDGE: UartBridge = UartBridge::new();
//!
//! // In the UART idle-line / DMA interrupt:
//! BRIDGE.on_rx_event(&dma_buf[..received]);
//! // In the TX-complete interrupt:
//! BRIDGE.on_tx_complete();
//!
//! let mut esp = EspAt::new(uart, &BRIDGE, Config::default(), App::default());
//! esp.initialize().await?;
//! esp.connect_ap("home", "secret").await?;
//!
//! let mut mqtt = MqttClient::new(esp, MqttConfig::default());
//! mqtt.init()?;
//! mqtt.connect_to_broker("broker.local", 1883, "node-1", "", "").await?;
//! mqtt.subscribe("device/cmd", QoS::AtMostOnce).await?;
//!
//! loop {
//!     mqtt.process_tick()?;
//!     Timer::after_millis(10).await;
//! }
//! ```
//!
//! ## Notifications
//!
//! Unsolicited lines (`WIFI CONNECTED`, `+IPD`, `+MQTTSUBRECV`, ...) are
//! delivered to one handler object implementing [`LinkEvents`] and
//! [`MqttEvents`]. Lines that arrive in the middle of a command exchange are
//! stashed and delivered on the next tick.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod buffer;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod link;
pub mod matcher;
pub mod mqtt;
pub mod transport;
pub mod util;

// Re-export key types for easier access at the crate root.
pub use command::ConnMode;
pub use config::{Config, MqttConfig};
pub use engine::CommandEngine;
pub use error::{Error, Result};
pub use events::{LinkEvents, MqttEvents, NoopEvents};
pub use link::EspAt;
pub use link::types::{ConnType, IpInfo, LinkId, RxData, WifiMode};
pub use matcher::{Expect, ResponseMatcher, SubstringMatcher};
pub use mqtt::MqttClient;
pub use mqtt::types::{Message, MqttState, QoS};
pub use transport::{Transport, Uart, UartBridge};
