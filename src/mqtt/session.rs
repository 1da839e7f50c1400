//! Session bookkeeping and event application.

use crate::command::ConnMode;
use crate::events::MqttEvents;

use super::subscriptions::SubscriptionTable;
use super::types::{BrokerConfig, ConnConfig, Counters, MqttState, UserConfig};
use super::urc;

/// Everything the driver tracks about the broker session.
#[derive(Debug, Default)]
pub struct MqttSession {
    pub(crate) initialized: bool,
    pub(crate) state: MqttState,
    pub(crate) user: UserConfig,
    pub(crate) conn: ConnConfig,
    pub(crate) broker: BrokerConfig,
    pub(crate) subscriptions: SubscriptionTable,
    pub(crate) counters: Counters,
}

impl MqttSession {
    /// A session in `NotInit` with no configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MqttState {
        self.state
    }

    pub fn user(&self) -> &UserConfig {
        &self.user
    }

    pub fn conn(&self) -> &ConnConfig {
        &self.conn
    }

    pub fn broker(&self) -> &BrokerConfig {
        &self.broker
    }

    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// A copy of the session counters.
    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Raises the state to a configuration checkpoint without ever lowering it.
    pub(crate) fn reach(&mut self, checkpoint: MqttState) {
        if self.state < checkpoint {
            self.state = checkpoint;
        }
    }

    /// Moves to a state; leaving the connected states drops all subscriptions.
    pub(crate) fn enter(&mut self, state: MqttState) {
        if !state.is_connected() {
            self.subscriptions.clear();
        }
        self.state = state;
    }
}

/// Delivers incoming messages, then applies broker session markers.
pub(crate) fn dispatch<H: MqttEvents>(
    bytes: &[u8],
    mode: ConnMode,
    session: &mut MqttSession,
    handler: &mut H,
) {
    if bytes.is_empty() || !session.initialized {
        return;
    }

    for msg in urc::Messages::new(bytes) {
        session.counters.received = session.counters.received.wrapping_add(1);
        debug!("message on {} ({} bytes)", msg.topic, msg.len);
        handler.on_message(&msg);
    }

    match urc::session_marker(bytes, mode) {
        Some(false) if session.state.is_connected() => {
            info!("broker session lost");
            session.enter(MqttState::Disconnected);
            handler.on_disconnected();
        }
        Some(true) if !session.state.is_connected() => {
            info!("broker session established");
            session.enter(MqttState::Connected);
            handler.on_connected();
        }
        _ => {}
    }
}
