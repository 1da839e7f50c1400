mod common;

use embassy_futures::block_on;
use myrtio_esp_at::mqtt::types::MAX_MESSAGE_LEN;
use myrtio_esp_at::{Error, MqttClient, MqttState, QoS};

use common::{Handle, Recorder, ScriptedUart, fast_mqtt_config, ready_driver};

type Client = MqttClient<'static, ScriptedUart, Recorder>;

const CONNECTED: &str = "+MQTTCONNECTED:0,1,\"broker.local\",\"1883\",\"\",1\r\n\r\nOK\r\n";

async fn initialized() -> (Client, Handle) {
    let (esp, script) = ready_driver().await;
    let mut mqtt = MqttClient::new(esp, fast_mqtt_config());
    mqtt.init().unwrap();
    (mqtt, script)
}

async fn connected() -> (Client, Handle) {
    let (mut mqtt, script) = initialized().await;
    script
        .on("AT+MQTTUSERCFG=", "\r\nOK\r\n")
        .on("AT+MQTTCONN=", CONNECTED);
    mqtt.connect_to_broker("broker.local", 1883, "node-1", "", "")
        .await
        .unwrap();
    (mqtt, script)
}

fn feed(mqtt: &mut Client, bytes: &[u8]) {
    mqtt.esp_mut()
        .engine_mut()
        .transport_mut()
        .uart_mut()
        .bridge()
        .on_rx_event(bytes);
}

#[test]
fn init_requires_initialized_driver() {
    let (bridge, uart, _script) = common::scripted();
    let esp = myrtio_esp_at::EspAt::new(uart, bridge, common::fast_config(), Recorder::default());
    let mut mqtt = MqttClient::new(esp, fast_mqtt_config());
    assert_eq!(mqtt.init(), Err(Error::NotInitialized));
    assert!(!mqtt.is_initialized());
}

#[test]
fn publish_before_connect_sends_nothing() {
    block_on(async {
        let (mut mqtt, script) = initialized().await;
        let before = script.script().sent_count();

        assert_eq!(
            mqtt.publish("t/1", "hello", QoS::AtMostOnce, false).await,
            Err(Error::NotConnected)
        );
        assert_eq!(
            mqtt.subscribe("t/1", QoS::AtMostOnce).await,
            Err(Error::NotConnected)
        );
        assert_eq!(script.script().sent_count(), before);
    });
}

#[test]
fn connect_walks_configuration_states() {
    block_on(async {
        let (mut mqtt, script) = connected().await;

        assert_eq!(mqtt.state(), MqttState::ConnNoSub);
        assert!(mqtt.is_connected());
        assert_eq!(mqtt.esp().handler().connected, 1);
        assert!(script
            .script()
            .was_sent("AT+MQTTUSERCFG=0,1,\"node-1\",\"\",\"\",0,0,\"\"\r\n"));
        assert!(script
            .script()
            .was_sent("AT+MQTTCONN=0,\"broker.local\",1883,1\r\n"));

        // The connect reply has already been seen.
        mqtt.process_tick().unwrap();
        assert_eq!(mqtt.esp().handler().connected, 1);
    });
}

#[test]
fn failed_connect_reports_connect_fail() {
    block_on(async {
        let (mut mqtt, script) = initialized().await;
        script
            .on("AT+MQTTUSERCFG=", "\r\nOK\r\n")
            .on("AT+MQTTCONN=", "\r\nERROR\r\n");

        assert_eq!(
            mqtt.connect_to_broker("broker.local", 1883, "node-1", "", "").await,
            Err(Error::ConnectFail)
        );
        assert_eq!(mqtt.state(), MqttState::Disconnected);
        assert_eq!(mqtt.esp().handler().errors, vec![Error::ConnectFail]);
    });
}

#[test]
fn connect_can_require_wifi() {
    block_on(async {
        let (esp, script) = ready_driver().await;
        let mut config = fast_mqtt_config();
        config.require_wifi = true;
        let mut mqtt = MqttClient::new(esp, config);
        mqtt.init().unwrap();
        mqtt.set_broker("broker.local", 1883, true).unwrap();

        let before = script.script().sent_count();
        assert_eq!(mqtt.connect().await, Err(Error::WifiNotConnected));
        assert_eq!(script.script().sent_count(), before);
    });
}

#[test]
fn resubscribing_updates_qos() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        script
            .on("AT+MQTTSUB=0,\"t/1\",0", "\r\nOK\r\n")
            .on("AT+MQTTSUB=0,\"t/1\",1", "\r\nOK\r\n");

        mqtt.subscribe("t/1", QoS::AtMostOnce).await.unwrap();
        mqtt.subscribe("t/1", QoS::AtLeastOnce).await.unwrap();

        assert_eq!(mqtt.subscriptions().len(), 1);
        assert_eq!(mqtt.subscriptions()[0].qos, QoS::AtLeastOnce);
        assert_eq!(mqtt.state(), MqttState::ConnWithSub);
        assert_eq!(mqtt.esp().handler().subscribed, vec!["t/1", "t/1"]);
    });
}

#[test]
fn subscription_capacity_is_enforced() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        for i in 0..8 {
            script.on("AT+MQTTSUB=", "\r\nOK\r\n");
            mqtt.subscribe(&format!("t/{i}"), QoS::AtMostOnce)
                .await
                .unwrap();
        }

        let before = script.script().sent_count();
        assert_eq!(
            mqtt.subscribe("t/8", QoS::AtMostOnce).await,
            Err(Error::BufferFull)
        );
        assert_eq!(script.script().sent_count(), before);

        script.on("AT+MQTTSUB=", "\r\nOK\r\n");
        assert_eq!(mqtt.subscribe("t/3", QoS::ExactlyOnce).await, Ok(()));
        assert_eq!(mqtt.subscriptions().len(), 8);
    });
}

#[test]
fn rejected_subscribe_is_subscribe_fail() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        script.on("AT+MQTTSUB=", "\r\nERROR\r\n");

        assert_eq!(
            mqtt.subscribe("t/1", QoS::AtMostOnce).await,
            Err(Error::SubscribeFail)
        );
        assert!(mqtt.subscriptions().is_empty());
        assert_eq!(mqtt.state(), MqttState::ConnNoSub);
    });
}

#[test]
fn unsubscribing_absent_topic_is_a_no_op() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        let before = script.script().sent_count();

        assert_eq!(mqtt.unsubscribe("nope").await, Ok(()));
        assert_eq!(script.script().sent_count(), before);
        assert!(mqtt.esp().handler().unsubscribed.is_empty());
    });
}

#[test]
fn removing_last_subscription_returns_to_no_sub() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        script
            .on("AT+MQTTSUB=", "\r\nOK\r\n")
            .on("AT+MQTTUNSUB=0,\"t/1\"", "\r\nOK\r\n");

        mqtt.subscribe("t/1", QoS::AtMostOnce).await.unwrap();
        mqtt.unsubscribe("t/1").await.unwrap();

        assert!(mqtt.subscriptions().is_empty());
        assert_eq!(mqtt.state(), MqttState::ConnNoSub);
        assert_eq!(mqtt.esp().handler().unsubscribed, vec!["t/1"]);
    });
}

#[test]
fn incoming_message_is_delivered_on_tick() {
    block_on(async {
        let (mut mqtt, _script) = connected().await;

        feed(&mut mqtt, b"+MQTTSUBRECV:0,\"t/1\",5,hello\r\n");
        mqtt.process_tick().unwrap();

        let handler = mqtt.esp().handler();
        assert_eq!(
            handler.messages,
            vec![("t/1".to_string(), b"hello".to_vec(), 5)]
        );
        assert_eq!(mqtt.counters().received, 1);
    });
}

#[test]
fn message_arriving_during_publish_is_not_lost() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        script
            .on("AT+MQTTPUBRAW=", "\r\nOK\r\n\r\n>")
            .on("on", "+MQTTSUBRECV:0,\"cmd\",3,off\r\n\r\n+MQTTPUB:OK\r\n");

        mqtt.publish("state", "on", QoS::AtMostOnce, false)
            .await
            .unwrap();
        assert!(mqtt.esp().handler().messages.is_empty());

        mqtt.process_tick().unwrap();
        assert_eq!(
            mqtt.esp().handler().messages,
            vec![("cmd".to_string(), b"off".to_vec(), 3)]
        );
    });
}

#[test]
fn broker_loss_clears_subscriptions() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        script.on("AT+MQTTSUB=", "\r\nOK\r\n");
        mqtt.subscribe("t/1", QoS::AtMostOnce).await.unwrap();

        feed(&mut mqtt, b"+MQTTDISCONNECTED:0\r\n");
        mqtt.process_tick().unwrap();

        assert_eq!(mqtt.state(), MqttState::Disconnected);
        assert!(mqtt.subscriptions().is_empty());
        assert_eq!(mqtt.esp().handler().disconnected, 1);

        feed(&mut mqtt, b"+MQTTCONNECTED:0,1,\"broker.local\",\"1883\",\"\",1\r\n");
        mqtt.process_tick().unwrap();
        assert_eq!(mqtt.state(), MqttState::Connected);
        assert_eq!(mqtt.esp().handler().connected, 2);
    });
}

#[test]
fn disconnect_then_query_adopts_reported_state() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        script
            .on("AT+MQTTSUB=", "\r\nOK\r\n")
            .on("AT+MQTTCLEAN=0", "\r\nOK\r\n")
            .on(
                "AT+MQTTCONN?",
                "+MQTTCONN:0,4,1,\"broker.local\",\"1883\",\"\",1\r\n\r\nOK\r\n",
            );
        mqtt.subscribe("t/1", QoS::AtMostOnce).await.unwrap();

        mqtt.disconnect().await.unwrap();
        assert_eq!(mqtt.state(), MqttState::Disconnected);
        assert!(mqtt.subscriptions().is_empty());
        assert_eq!(mqtt.esp().handler().disconnected, 1);

        assert_eq!(mqtt.query_connection().await, Ok(MqttState::Connected));
        assert_eq!(mqtt.state(), MqttState::Connected);
    });
}

#[test]
fn raw_publish_success() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        script
            .on("AT+MQTTPUBRAW=0,\"t/1\",4,1,0", "\r\nOK\r\n\r\n>")
            .on_bytes(&[0, 1, 2, 3], b"\r\n+MQTTPUB:OK\r\n");

        mqtt.publish_raw("t/1", &[0, 1, 2, 3], QoS::AtLeastOnce, false)
            .await
            .unwrap();
        assert_eq!(mqtt.counters().published, 1);
        assert_eq!(mqtt.esp().handler().published, vec!["t/1"]);
    });
}

#[test]
fn raw_publish_needs_explicit_acknowledgement() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        script
            .on("AT+MQTTPUBRAW=", "\r\nOK\r\n\r\n>")
            .on("data", "\r\nOK\r\n");

        assert_eq!(
            mqtt.publish_raw("t/1", b"data", QoS::AtMostOnce, false).await,
            Err(Error::PublishFail)
        );
        assert_eq!(mqtt.counters().published, 0);
    });
}

#[test]
fn unconfirmed_text_publish_times_out() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        script.on("AT+MQTTPUBRAW=", "\r\nOK\r\n\r\n>");

        assert_eq!(
            mqtt.publish("t/1", "hello", QoS::AtMostOnce, false).await,
            Err(Error::Timeout)
        );
        assert!(mqtt.esp().handler().published.is_empty());
    });
}

#[test]
fn publish_rejects_empty_topic_and_payload() {
    block_on(async {
        let (mut mqtt, _script) = connected().await;
        assert_eq!(
            mqtt.publish("", "x", QoS::AtMostOnce, false).await,
            Err(Error::InvalidParam)
        );
        assert_eq!(
            mqtt.publish("t", "", QoS::AtMostOnce, false).await,
            Err(Error::InvalidParam)
        );
    });
}

#[test]
fn keep_alive_is_clamped_and_pushed_once_configured() {
    block_on(async {
        let (mut mqtt, script) = initialized().await;

        // Before the identity is set only the local copy changes.
        let before = script.script().sent_count();
        mqtt.set_keep_alive(60).await.unwrap();
        assert_eq!(script.script().sent_count(), before);
        assert_eq!(mqtt.session().conn().keep_alive, 60);

        script
            .on("AT+MQTTUSERCFG=", "\r\nOK\r\n")
            .on("AT+MQTTCONNCFG=", "\r\nOK\r\n");
        mqtt.set_user_config_simple("node-1", "", "").await.unwrap();
        assert_eq!(mqtt.state(), MqttState::UserSet);

        mqtt.set_keep_alive(u16::MAX).await.unwrap();
        assert!(script
            .script()
            .was_sent("AT+MQTTCONNCFG=0,7200,0,\"\",\"\",0,0\r\n"));
        assert_eq!(mqtt.state(), MqttState::ConnSet);
    });
}

#[test]
fn rejected_user_config_is_not_stored() {
    block_on(async {
        let (mut mqtt, script) = initialized().await;
        script.on("AT+MQTTUSERCFG=", "\r\nERROR\r\n");

        assert_eq!(
            mqtt.set_user_config_simple("node-1", "", "").await,
            Err(Error::ErrorResponse)
        );
        assert_eq!(mqtt.state(), MqttState::NotInit);
        assert!(mqtt.session().user().client_id.is_empty());
    });
}

#[test]
fn markers_inside_a_message_do_not_change_session_state() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        script
            .on("AT+CWJAP=", "WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n")
            .on("AT+MQTTSUB=", "\r\nOK\r\n");
        mqtt.esp_mut().connect_ap("home", "secret").await.unwrap();
        mqtt.subscribe("cmd", QoS::AtMostOnce).await.unwrap();

        feed(
            &mut mqtt,
            b"+MQTTSUBRECV:0,\"cmd\",35,WIFI DISCONNECT +MQTTDISCONNECTED:0\r\n",
        );
        mqtt.process_tick().unwrap();

        let handler = mqtt.esp().handler();
        assert_eq!(
            handler.messages,
            vec![(
                "cmd".to_string(),
                b"WIFI DISCONNECT +MQTTDISCONNECTED:0".to_vec(),
                35
            )]
        );
        assert_eq!((handler.wifi_down, handler.disconnected), (0, 0));
        assert!(mqtt.esp().is_wifi_connected());
        assert_eq!(mqtt.state(), MqttState::ConnWithSub);
        assert_eq!(mqtt.subscriptions().len(), 1);

        // The same markers as real lines still apply.
        feed(&mut mqtt, b"+MQTTDISCONNECTED:0\r\n");
        mqtt.process_tick().unwrap();
        assert_eq!(mqtt.state(), MqttState::Disconnected);
    });
}

#[test]
fn reconnect_resends_identity_without_restoring_subscriptions() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        script
            .on("AT+MQTTSUB=", "\r\nOK\r\n")
            .on("AT+MQTTCLEAN=0", "\r\nOK\r\n")
            .on("AT+MQTTUSERCFG=", "\r\nOK\r\n")
            .on("AT+MQTTCONN=", CONNECTED);
        mqtt.subscribe("t/1", QoS::AtMostOnce).await.unwrap();

        mqtt.reconnect().await.unwrap();

        assert_eq!(mqtt.counters().reconnects, 1);
        assert_eq!(mqtt.state(), MqttState::ConnNoSub);
        assert!(mqtt.subscriptions().is_empty());
        assert_eq!(mqtt.esp().handler().connected, 2);

        let script = script.script();
        let sent = script.sent();
        let count = |prefix: &str| sent.iter().filter(|s| s.starts_with(prefix)).count();
        assert_eq!(count("AT+MQTTUSERCFG=0,1,\"node-1\""), 2);
        assert_eq!(count("AT+MQTTSUB="), 1);
        assert_eq!(script.pending_rules(), 0);
    });
}

#[test]
fn binary_publish_of_full_message_size_needs_explicit_acknowledgement() {
    block_on(async {
        let (mut mqtt, script) = connected().await;
        let short = vec![b's'; MAX_MESSAGE_LEN - 1];
        let long = vec![b'l'; MAX_MESSAGE_LEN];
        script
            .on(&format!("AT+MQTTPUBRAW=0,\"t/1\",{},", short.len()), "\r\nOK\r\n\r\n>")
            .on("sss", "\r\nOK\r\n")
            .on(&format!("AT+MQTTPUBRAW=0,\"t/1\",{},", long.len()), "\r\nOK\r\n\r\n>")
            .on("lll", "\r\nOK\r\n");

        mqtt.publish_data("t/1", &short, QoS::AtMostOnce, false)
            .await
            .unwrap();
        assert_eq!(
            mqtt.publish_data("t/1", &long, QoS::AtMostOnce, false).await,
            Err(Error::PublishFail)
        );
        assert_eq!(mqtt.counters().published, 1);
        assert_eq!(mqtt.esp().handler().published, vec!["t/1"]);
    });
}
