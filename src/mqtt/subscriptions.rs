//! The set of topics the session is subscribed to.

use heapless::{String, Vec};

use crate::error::{Error, Result};

use super::types::{MAX_SUBSCRIPTIONS, MAX_TOPIC_LEN, QoS};

/// An active subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String<MAX_TOPIC_LEN>,
    pub qos: QoS,
}

/// Subscriptions keyed by topic. Holds at most [`MAX_SUBSCRIPTIONS`] entries.
///
/// ```ignore
/// let mut subs = SubscriptionTable::new();
/// subs.upsert("device/cmd", QoS::AtMostOnce)?;
/// subs.upsert("device/cmd", QoS::AtLeastOnce)?; // updates in place
/// assert_eq!(subs.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: Vec<Subscription, MAX_SUBSCRIPTIONS>,
}

impl SubscriptionTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a topic or updates the QoS of an existing one.
    ///
    /// Fails with `BufferFull` only when a new topic does not fit, and with
    /// `InvalidParam` when the topic is too long.
    pub fn upsert(&mut self, topic: &str, qos: QoS) -> Result<()> {
        if let Some(entry) = self.entries.iter_mut().find(|s| s.topic == topic) {
            entry.qos = qos;
            return Ok(());
        }
        if self.entries.is_full() {
            return Err(Error::BufferFull);
        }
        let topic = String::try_from(topic).map_err(|_| Error::InvalidParam)?;
        self.entries
            .push(Subscription { topic, qos })
            .map_err(|_| Error::BufferFull)
    }

    /// Returns `true` if the topic was present.
    pub fn remove(&mut self, topic: &str) -> bool {
        match self.entries.iter().position(|s| s.topic == topic) {
            Some(i) => {
                self.entries.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// Whether `topic` is subscribed, compared byte for byte.
    pub fn contains(&self, topic: &str) -> bool {
        self.entries.iter().any(|s| s.topic == topic)
    }

    /// True if `topic` is already present or there is room for it.
    pub fn has_room_for(&self, topic: &str) -> bool {
        self.contains(topic) || !self.entries.is_full()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Subscription] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets every subscription.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resubscribing_updates_qos_in_place() {
        let mut subs = SubscriptionTable::new();
        subs.upsert("a", QoS::AtMostOnce).unwrap();
        subs.upsert("a", QoS::ExactlyOnce).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs.as_slice()[0].qos, QoS::ExactlyOnce);
    }

    #[test]
    fn capacity_is_enforced_for_new_topics_only() {
        let mut subs = SubscriptionTable::new();
        let topics = ["t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7"];
        for t in topics {
            subs.upsert(t, QoS::AtMostOnce).unwrap();
        }
        assert_eq!(subs.upsert("t8", QoS::AtMostOnce), Err(Error::BufferFull));
        assert_eq!(subs.upsert("t3", QoS::AtLeastOnce), Ok(()));
        assert!(!subs.has_room_for("t8"));
        assert_eq!(subs.len(), MAX_SUBSCRIPTIONS);
    }

    #[test]
    fn removing_absent_topic_changes_nothing() {
        let mut subs = SubscriptionTable::new();
        subs.upsert("a", QoS::AtMostOnce).unwrap();
        assert!(!subs.remove("b"));
        assert_eq!(subs.len(), 1);
        assert!(subs.remove("a"));
        assert!(subs.is_empty());
    }

    #[test]
    fn overlong_topic_is_rejected() {
        let mut subs = SubscriptionTable::new();
        let long = [b'x'; MAX_TOPIC_LEN + 1];
        let long = core::str::from_utf8(&long).unwrap();
        assert_eq!(subs.upsert(long, QoS::AtMostOnce), Err(Error::InvalidParam));
    }
}
