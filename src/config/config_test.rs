use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_labkv_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("LABKV__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let settings = Settings::default();

    assert_eq!(settings.cache.namespace, "kvs");
    assert_eq!(settings.cache.watch_session_timeout_secs, 3600);
    assert_eq!(settings.bus.event_batch_size, 5000);
    assert_eq!(settings.bus.event_batch_interval_ms, 500);
    assert!(!settings.bus.immediate);
    assert_eq!(settings.retry.base_delay_ms, 1000);
    assert!(!settings.monitoring.prometheus_enabled);
}

#[test]
#[serial]
fn load_should_merge_environment_overrides() {
    cleanup_all_labkv_env_vars();
    with_vars(
        vec![
            ("LABKV__CACHE__DOC_TTL_SECS", Some("60")),
            ("LABKV__BUS__IMMEDIATE", Some("true")),
        ],
        || {
            let settings = Settings::load(None).unwrap();

            assert_eq!(settings.cache.doc_ttl_secs, 60);
            assert!(settings.bus.immediate);
        },
    );
}

#[test]
#[serial]
fn load_should_merge_file_settings() {
    cleanup_all_labkv_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("node_config.toml");

    std::fs::write(
        &config_path,
        r#"
        [cluster]
        listen_peer_addr = "127.0.0.1:6000"
        peer_seeds = ["127.0.0.1:6001"]

        [bus]
        event_batch_size = 10
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let settings = Settings::load(config_path.to_str()).unwrap();

        assert_eq!(settings.cluster.listen_peer_addr.port(), 6000);
        assert_eq!(settings.cluster.peer_seeds, vec!["127.0.0.1:6001".to_string()]);
        assert_eq!(settings.bus.event_batch_size, 10);
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_labkv_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("node_config.toml");
    std::fs::write(
        &config_path,
        r#"
        [cache]
        doc_ttl_secs = 120
        "#,
    )
    .unwrap();

    with_vars(vec![("LABKV__CACHE__DOC_TTL_SECS", Some("7"))], || {
        let settings = Settings::load(config_path.to_str()).unwrap();
        assert_eq!(settings.cache.doc_ttl_secs, 7);
    });
}

#[test]
fn validation_should_fail_with_invalid_batch_size() {
    let mut settings = Settings::default();
    settings.bus.event_batch_size = 0;

    assert!(settings.validate().is_err());
}

#[test]
fn validation_should_reject_malformed_peer_seed() {
    let mut settings = Settings::default();
    settings.cluster.peer_seeds = vec!["not-an-address".to_string()];

    assert!(settings.validate().is_err());
}

#[test]
fn validation_should_reject_empty_namespace() {
    let mut settings = Settings::default();
    settings.cache.namespace = String::new();

    assert!(settings.validate().is_err());
}

#[test]
fn peer_address_should_prefer_advertise_addr() {
    let mut cluster = ClusterConfig::default();
    assert_eq!(cluster.peer_address(), cluster.listen_peer_addr.to_string());

    cluster.advertise_addr = "10.0.0.5:5931".to_string();
    assert_eq!(cluster.peer_address(), "10.0.0.5:5931");
}
