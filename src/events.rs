//! Listener traits for asynchronous notifications.
//!
//! The driver calls into one handler object that implements the capability
//! for each event category it cares about. Every method has a no-op default,
//! so a handler only overrides what it needs.
//!
//! Callbacks run synchronously from inside a driver operation or a
//! processing tick. They receive borrowed data and cannot call back into the
//! driver; record what is needed and act on it after the call returns.
//!
//! # Example
//!
//! ```ignore
//! struct App {
//!     online: bool,
//!     last_command: heapless::String<64>,
//! }
//!
//! impl LinkEvents for App {
//!     fn on_wifi_disconnected(&mut self) {
//!         self.online = false;
//!     }
//! }
//!
//! impl MqttEvents for App {
//!     fn on_message(&mut self, msg: &Message<'_>) {
//!         if msg.topic == "device/cmd" {
//!             self.last_command.clear();
//!             let _ = self.last_command.push_str(msg.payload_str());
//!         }
//!     }
//! }
//! ```

use crate::error::Error;
use crate::link::types::{LinkId, RxData};
use crate::mqtt::types::Message;

/// Notifications of the WiFi and link layer.
pub trait LinkEvents {
    /// Data arrived on a link (`+IPD`).
    fn on_data_received(&mut self, _data: &RxData<'_>) {}

    fn on_wifi_connected(&mut self) {}

    fn on_wifi_disconnected(&mut self) {}

    /// A remote client opened a link to the local server.
    fn on_client_connected(&mut self, _link: LinkId) {}

    /// A link to the local server was closed.
    fn on_client_disconnected(&mut self, _link: LinkId) {}
}

/// Notifications of the MQTT session.
pub trait MqttEvents {
    fn on_connected(&mut self) {}

    fn on_disconnected(&mut self) {}

    /// A message arrived on a subscribed topic.
    ///
    /// The message borrows the receive buffer and is only valid for the call.
    fn on_message(&mut self, _msg: &Message<'_>) {}

    fn on_publish_complete(&mut self, _topic: &str) {}

    fn on_subscribed(&mut self, _topic: &str) {}

    fn on_unsubscribed(&mut self, _topic: &str) {}

    fn on_error(&mut self, _error: Error) {}
}

/// A handler that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl LinkEvents for NoopEvents {}

impl MqttEvents for NoopEvents {}

impl<T: LinkEvents + ?Sized> LinkEvents for &mut T {
    fn on_data_received(&mut self, data: &RxData<'_>) {
        (**self).on_data_received(data)
    }

    fn on_wifi_connected(&mut self) {
        (**self).on_wifi_connected()
    }

    fn on_wifi_disconnected(&mut self) {
        (**self).on_wifi_disconnected()
    }

    fn on_client_connected(&mut self, link: LinkId) {
        (**self).on_client_connected(link)
    }

    fn on_client_disconnected(&mut self, link: LinkId) {
        (**self).on_client_disconnected(link)
    }
}

impl<T: MqttEvents + ?Sized> MqttEvents for &mut T {
    fn on_connected(&mut self) {
        (**self).on_connected()
    }

    fn on_disconnected(&mut self) {
        (**self).on_disconnected()
    }

    fn on_message(&mut self, msg: &Message<'_>) {
        (**self).on_message(msg)
    }

    fn on_publish_complete(&mut self, topic: &str) {
        (**self).on_publish_complete(topic)
    }

    fn on_subscribed(&mut self, topic: &str) {
        (**self).on_subscribed(topic)
    }

    fn on_unsubscribed(&mut self, topic: &str) {
        (**self).on_unsubscribed(topic)
    }

    fn on_error(&mut self, error: Error) {
        (**self).on_error(error)
    }
}
