use rr_domain::config::{Config, ConfigSeverity};

#[test]
fn default_host_binds_all_interfaces() {
    let config = Config::default();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 2345);
}

#[test]
fn default_endpoints_match_streamer_and_client_paths() {
    let config = Config::default();
    assert_eq!(config.server.streamer_path, "/");
    assert_eq!(config.server.client_path, "/client");
}

#[test]
fn full_file_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 4000
client_path = "/remote"

[relay]
password_env = "STREAM_PASSWORD"
request_timeout_secs = 5

[observability]
service_name = "relay-test"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.addr(), "0.0.0.0:4000");
    assert_eq!(config.server.client_path, "/remote");
    assert_eq!(config.relay.password_env, "STREAM_PASSWORD");
    assert_eq!(config.relay.request_timeout_secs, 5);
    assert_eq!(config.observability.service_name, "relay-test");
    assert!(config.validate().is_empty());
}

#[test]
fn empty_file_is_all_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.relay.request_timeout_secs, 30);
    assert!(config.observability.otlp_endpoint.is_none());
}

#[test]
fn out_of_range_sample_rate_is_an_error() {
    let toml_str = r#"
[observability]
sample_rate = 2.0
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.field == "observability.sample_rate" && i.severity == ConfigSeverity::Error));
}
