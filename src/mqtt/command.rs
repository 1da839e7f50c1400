//! MQTT AT command shapes.

use crate::command::{Command, Escaped, build};
use crate::error::Result;

use super::types::{BrokerConfig, ConnConfig, MQTT_LINK_ID, QoS, UserConfig};

pub const CLEAN: &str = "AT+MQTTCLEAN=0\r\n";
pub const QUERY_CONN: &str = "AT+MQTTCONN?\r\n";

fn flag(b: bool) -> u8 {
    u8::from(b)
}

/// `AT+MQTTUSERCFG` carrying the client identity.
pub fn user_config(cfg: &UserConfig) -> Result<Command> {
    build(format_args!(
        "AT+MQTTUSERCFG={},{},\"{}\",\"{}\",\"{}\",{},{},\"{}\"\r\n",
        MQTT_LINK_ID,
        cfg.scheme as u8,
        Escaped(&cfg.client_id),
        Escaped(&cfg.username),
        Escaped(&cfg.password),
        cfg.cert_key_id,
        cfg.ca_id,
        Escaped(&cfg.path)
    ))
}

/// `AT+MQTTCONNCFG` carrying keep-alive, clean session and the last will.
pub fn conn_config(cfg: &ConnConfig) -> Result<Command> {
    build(format_args!(
        "AT+MQTTCONNCFG={},{},{},\"{}\",\"{}\",{},{}\r\n",
        MQTT_LINK_ID,
        cfg.keep_alive,
        flag(cfg.disable_clean_session),
        Escaped(&cfg.lwt_topic),
        Escaped(&cfg.lwt_message),
        cfg.lwt_qos as u8,
        flag(cfg.lwt_retain)
    ))
}

/// `AT+MQTTCONN` to the configured broker.
pub fn connect(broker: &BrokerConfig) -> Result<Command> {
    build(format_args!(
        "AT+MQTTCONN={},\"{}\",{},{}\r\n",
        MQTT_LINK_ID,
        Escaped(&broker.host),
        broker.port,
        flag(broker.reconnect)
    ))
}

/// `AT+MQTTSUB`.
pub fn subscribe(topic: &str, qos: QoS) -> Result<Command> {
    build(format_args!(
        "AT+MQTTSUB={},\"{}\",{}\r\n",
        MQTT_LINK_ID,
        Escaped(topic),
        qos as u8
    ))
}

/// `AT+MQTTUNSUB`.
pub fn unsubscribe(topic: &str) -> Result<Command> {
    build(format_args!(
        "AT+MQTTUNSUB={},\"{}\"\r\n",
        MQTT_LINK_ID,
        Escaped(topic)
    ))
}

/// Length-prefixed publish: the payload follows the `>` prompt unescaped.
pub fn publish_raw(topic: &str, len: usize, qos: QoS, retain: bool) -> Result<Command> {
    build(format_args!(
        "AT+MQTTPUBRAW={},\"{}\",{},{},{}\r\n",
        MQTT_LINK_ID,
        Escaped(topic),
        len,
        qos as u8,
        flag(retain)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_commands() {
        let mut user = UserConfig::default();
        user.client_id = "node-1".try_into().unwrap();
        assert_eq!(
            user_config(&user).unwrap().as_str(),
            "AT+MQTTUSERCFG=0,1,\"node-1\",\"\",\"\",0,0,\"\"\r\n"
        );
        assert_eq!(
            conn_config(&ConnConfig::default()).unwrap().as_str(),
            "AT+MQTTCONNCFG=0,120,0,\"\",\"\",0,0\r\n"
        );
        let mut broker = BrokerConfig::default();
        broker.host = "broker.local".try_into().unwrap();
        assert_eq!(
            connect(&broker).unwrap().as_str(),
            "AT+MQTTCONN=0,\"broker.local\",1883,1\r\n"
        );
    }

    #[test]
    fn topic_commands() {
        assert_eq!(
            subscribe("t/1", QoS::AtLeastOnce).unwrap().as_str(),
            "AT+MQTTSUB=0,\"t/1\",1\r\n"
        );
        assert_eq!(unsubscribe("t/1").unwrap().as_str(), "AT+MQTTUNSUB=0,\"t/1\"\r\n");
        assert_eq!(
            publish_raw("t/1", 5, QoS::AtMostOnce, true).unwrap().as_str(),
            "AT+MQTTPUBRAW=0,\"t/1\",5,0,1\r\n"
        );
    }
}
