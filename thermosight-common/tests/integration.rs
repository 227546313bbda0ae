//! Integration tests for thermosight-common library.

use serde::Deserialize;
use thermosight_common::{
    LoggingConfig, TopicResolver, ZenohConfig, format_value, parse_config,
};

#[derive(Debug, Deserialize)]
struct BridgeFile {
    #[serde(default)]
    zenoh: ZenohConfig,
    #[serde(default)]
    logging: LoggingConfig,
    topic: String,
}

#[test]
fn test_reading_to_topic_and_payload() {
    let config: BridgeFile = parse_config(
        r#"{
            // comments are allowed in bridge files
            topic: "house",
            zenoh: { mode: "client", connect: ["tcp/emon:7447"] },
        }"#,
    )
    .expect("config should parse");

    let topics = TopicResolver::new(config.topic);
    let topic = topics.resolve("flow_temp");
    let payload = format_value(23.562);

    assert_eq!(topic, "house/flow_temp");
    assert_eq!(payload, "23.562");
    assert_eq!(payload.parse::<f64>().unwrap(), 23.562);
    assert_eq!(config.zenoh.connect, vec!["tcp/emon:7447"]);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_verbatim_topic_keeps_payload_format() {
    let topics = TopicResolver::new("house");

    assert_eq!(topics.resolve("heating/pump"), "heating/pump");
    assert_eq!(format_value(0.0), "0");
    assert_eq!(format_value(1.0), "1");
}

#[test]
fn test_invalid_config_reports_error() {
    let result: thermosight_common::Result<BridgeFile> = parse_config("{ zenoh: ");
    assert!(result.is_err());
}
