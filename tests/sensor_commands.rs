mod common;

use common::*;
use sensorcon::settings::{DhtType, OneWireAddress, DHT_PIN_OFF};

#[test]
fn interval_scenario() {
    let mut h = harness();
    let (mut s, t) = connect_serial(&mut h);

    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set interval 60"),
        "Measurement interval set to 60 seconds\n> "
    );
    assert_eq!(h.ctx.settings.get().measurement_interval_seconds, 60);
    assert_eq!(h.backend.writes(), 1);
    assert!(!h.ctx.settings.is_dirty());

    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set interval"),
        "Current measurement interval: 60 seconds\n> "
    );
    assert_eq!(serial(&mut s, &mut h, &t, "s.set interval abc"), "invalid number\n> ");
    assert_eq!(serial(&mut s, &mut h, &t, "s.set interval 0"), "invalid number\n> ");
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set interval 99999999999"),
        "invalid number\n> "
    );
    assert_eq!(h.ctx.settings.get().measurement_interval_seconds, 60);
    assert_eq!(h.backend.writes(), 1);
}

#[test]
fn ds_address_needs_eight_bytes() {
    let mut h = harness();
    let (mut s, t) = connect_serial(&mut h);

    let out = serial(&mut s, &mut h, &t, "s.set ds address 0 28 FF 64 1E 04 16 03");
    assert_eq!(
        out,
        "invalid or incomplete sensor address - required is: AA BB CC DD EE FF GG HH\n> "
    );
    assert!(h.ctx.settings.get().sensor_entries[0].address.is_unset());

    let out = serial(&mut s, &mut h, &t, "s.set ds address 0 28 FF 64 1E 04 16 03 5C 11");
    assert!(out.starts_with("invalid or incomplete sensor address"));

    let out = serial(&mut s, &mut h, &t, "s.set ds address 0 28 FF 64 1E 04 16 03 ZZ");
    assert!(out.starts_with("invalid or incomplete sensor address"));

    let out = serial(&mut s, &mut h, &t, "s.set ds address 2 28 ff 64 1e 04 16 03 5c");
    assert_eq!(out, "address [2] set to 28 FF 64 1E 04 16 03 5C\n> ");
    assert_eq!(
        h.ctx.settings.get().sensor_entries[2].address,
        OneWireAddress([0x28, 0xFF, 0x64, 0x1E, 0x04, 0x16, 0x03, 0x5C])
    );
}

#[test]
fn ds_index_is_range_checked() {
    let mut h = harness();
    let (mut s, t) = connect_serial(&mut h);
    for line in ["s.set ds address 4 28 FF 64 1E 04 16 03 5C", "s.set ds topic", "s.set ds topic x"] {
        assert_eq!(
            serial(&mut s, &mut h, &t, line),
            "invalid or no sensor index allowed range: 0 .. 3\n> ",
            "{line}"
        );
    }
}

#[test]
fn ds_topic_show_set_and_reject_wildcards() {
    let mut h = harness();
    let (mut s, t) = connect_serial(&mut h);
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set ds topic 1"),
        "current topic[1]: <not set>\n> "
    );
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set ds topic 1 home/cellar/temp"),
        "topic[1] set to \"home/cellar/temp\"\n> "
    );
    let out = serial(&mut s, &mut h, &t, "s.set ds topic 1 home/#");
    assert!(out.starts_with("invalid topic[1] - topic must not contain MQTT wildcards"));
    assert_eq!(
        h.ctx.settings.get().sensor_entries[1].topic.as_str(),
        "home/cellar/temp"
    );
}

#[test]
fn long_topic_is_clipped_and_reported() {
    let mut h = harness();
    let (mut s, t) = connect_serial(&mut h);
    let topic = format!("home/{}", "a".repeat(80));
    let out = serial(&mut s, &mut h, &t, &format!("s.set dht ttopic {topic}"));
    assert!(out.contains("(truncated to 63 characters)"));
    assert_eq!(h.ctx.settings.get().dht_temperature_topic.as_str(), &topic[..63]);
}

#[test]
fn ds_pin_uses_board_indices() {
    let mut h = harness();
    let (mut s, t) = connect_serial(&mut h);
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set ds pin"),
        "current pin: 4 (gpio 2)\n> "
    );
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set ds pin 1"),
        "pin set to idx 1 (gpio 5)\n> "
    );
    assert_eq!(h.ctx.settings.get().one_wire_pin, 5);
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set ds pin 9"),
        "invalid pin index - allowed [0 .. 8]\n> "
    );
}

#[test]
fn ds_field_must_be_known() {
    let mut h = harness();
    let (mut s, t) = connect_serial(&mut h);
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set ds colour 1"),
        "invalid or no configuration field - should be one of {address|topic|pin}\n> "
    );
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set lamp"),
        "invalid device - should be one of {ds|dht|bme}\n> "
    );
}

#[test]
fn dht_pin_type_and_topics() {
    let mut h = harness();
    let (mut s, t) = connect_serial(&mut h);
    assert_eq!(serial(&mut s, &mut h, &t, "s.set dht pin"), "current pin: off\n> ");
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set dht pin 5"),
        "pin set to idx 5 (gpio 14)\n> "
    );
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set dht type dht22"),
        "dht type set to DHT22\n> "
    );
    assert_eq!(h.ctx.settings.get().dht_type, DhtType::Dht22);
    assert!(serial(&mut s, &mut h, &t, "s.set dht type dht99").starts_with("invalid dht type"));
    serial(&mut s, &mut h, &t, "s.set dht htopic home/attic/humidity");

    let info = serial(&mut s, &mut h, &t, "s.info");
    assert!(info.contains("DHT:\n         pin: 14\n        type: DHT22\n"));
    assert!(info.contains("  humi topic: home/attic/humidity\n"));
    assert!(info.contains("  temp topic: <not set>\n"));

    serial(&mut s, &mut h, &t, "s.set dht pin off");
    assert_eq!(h.ctx.settings.get().dht_pin, DHT_PIN_OFF);
    assert!(serial(&mut s, &mut h, &t, "s.info").contains("DHT: <off>\n"));
}

#[test]
fn bme_names() {
    let mut h = harness();
    let (mut s, t) = connect_serial(&mut h);
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set bme temp"),
        "current temperature name: temperature\n> "
    );
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set bme temp t"),
        "temperature name set to \"t\"\n> "
    );
    assert!(serial(&mut s, &mut h, &t, "s.set bme gas-res a/b").starts_with("invalid gas resistance name"));
    serial(&mut s, &mut h, &t, "s.set bme base home/bme");
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set bme light x"),
        "invalid field - must be one of {base|temp|pressure|humidity|gas-res}\n> "
    );
    let info = serial(&mut s, &mut h, &t, "s.info");
    assert!(info.contains("BME680:\n  base topic: home/bme\n   temp name: t\n"));
}

#[test]
fn info_without_bme_and_with_interval() {
    let mut h = harness_on(sensorcon::settings::MemoryBackend::new(), false);
    let (mut s, t) = connect_serial(&mut h);
    let info = serial(&mut s, &mut h, &t, "s.info");
    assert!(info.contains("BME680: <not attached>\n"));
    assert!(info.contains("       topic[0]: <none>\n"));
    assert!(info.ends_with("----\n    interval: 1800 seconds\n> "));
}

#[test]
fn scan_lists_bus_addresses() {
    let mut h = harness();
    let (mut s, t) = connect_serial(&mut h);
    assert_eq!(
        serial(&mut s, &mut h, &t, "s.scan"),
        "Scanning for sensors ... 2 found:\n  0: 28 FF 64 1E 04 16 03 5C\n  1: 28 AA 01 02 03 04 05 06\n> "
    );
}

#[test]
fn trig_raises_measurement_flag() {
    let mut h = harness();
    let (mut s, t) = connect_serial(&mut h);
    assert!(!h.trigger.take());
    assert_eq!(serial(&mut s, &mut h, &t, "s.trig"), "measurement triggered\n> ");
    assert!(h.trigger.take());
    assert!(!h.trigger.take());
}

#[test]
fn failed_commit_keeps_value_in_memory() {
    let mut h = harness();
    let (mut s, t) = connect_serial(&mut h);
    h.backend.set_fail_writes(true);
    let out = serial(&mut s, &mut h, &t, "s.set interval 90");
    assert_eq!(
        out,
        "settings not saved: storage unavailable: write rejected by medium\n> "
    );
    assert_eq!(h.ctx.settings.get().measurement_interval_seconds, 90);
    assert!(h.ctx.settings.is_dirty());

    h.backend.set_fail_writes(false);
    serial(&mut s, &mut h, &t, "s.set interval 90");
    assert!(!h.ctx.settings.is_dirty());
    assert_eq!(h.backend.writes(), 1);
}

#[test]
fn trailing_tokens_are_rejected() {
    let mut h = harness();
    let (mut s, t) = connect_serial(&mut h);

    assert_eq!(
        serial(&mut s, &mut h, &t, "s.set interval 7 xxx"),
        "unexpected argument \"xxx\"\n> "
    );
    assert_eq!(h.ctx.settings.get().measurement_interval_seconds, 1800);

    assert_eq!(
        serial(&mut s, &mut h, &t, "c.host kitchen extra"),
        "unexpected argument \"extra\"\n> "
    );
    assert!(serial(&mut s, &mut h, &t, "s.set dht type dht11 dht22").starts_with("unexpected argument"));
    assert!(serial(&mut s, &mut h, &t, "s.set ds pin 3 4").starts_with("unexpected argument"));
    assert!(serial(&mut s, &mut h, &t, "s.set dht pin off now").starts_with("unexpected argument"));
    assert_eq!(h.ctx.settings.get().dht_type, DhtType::Dht11);
    assert_eq!(h.backend.writes(), 0);
}
