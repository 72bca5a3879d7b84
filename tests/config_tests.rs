use pretty_assertions::assert_eq;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::time::Duration;

use shiftcal::config::Config;

mod common;

const KEYS: [&str; 7] = [
    "SYNC_FALLBACK_INTERVAL_SECS",
    "TIMELINE_START_HOUR",
    "TIMELINE_END_HOUR",
    "LAYOUT_CACHE_CAPACITY",
    "LAYOUT_CACHE_TTL_SECS",
    "SUBSCRIPTION_BUFFER",
    "ENVIRONMENT",
];

fn clear_env() {
    for key in KEYS {
        unsafe {
            env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn test_config_defaults() {
    common::setup_test_env();
    clear_env();

    let config = Config::from_env_only().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.sync_fallback_interval(), Duration::from_secs(30));
    assert_eq!(config.timeline_axis().unwrap().start_hour, 6.0);
    assert_eq!(config.timeline_axis().unwrap().end_hour, 22.0);
    assert!(config.is_development());
}

#[test]
#[serial]
fn test_config_custom_values() {
    clear_env();
    unsafe {
        env::set_var("SYNC_FALLBACK_INTERVAL_SECS", "5");
        env::set_var("TIMELINE_START_HOUR", "7.5");
        env::set_var("TIMELINE_END_HOUR", "20");
        env::set_var("LAYOUT_CACHE_TTL_SECS", "10");
        env::set_var("ENVIRONMENT", "production");
    }

    let config = Config::from_env_only().unwrap();
    assert_eq!(config.sync_fallback_interval(), Duration::from_secs(5));
    assert_eq!(config.timeline_start_hour, 7.5);
    assert_eq!(config.timeline_end_hour, 20.0);
    assert_eq!(config.layout_cache_ttl(), Duration::from_secs(10));
    assert!(config.is_production());

    clear_env();
}

#[test]
#[serial]
fn test_unparseable_numbers_fall_back_to_defaults() {
    clear_env();
    unsafe {
        env::set_var("SYNC_FALLBACK_INTERVAL_SECS", "soon");
        env::set_var("LAYOUT_CACHE_CAPACITY", "-4");
    }

    let config = Config::from_env_only().unwrap();
    assert_eq!(config.sync_fallback_interval_secs, 30);
    assert_eq!(config.layout_cache_capacity, 512);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    clear_env();
    unsafe {
        env::set_var("TIMELINE_START_HOUR", "22");
        env::set_var("TIMELINE_END_HOUR", "6");
    }
    let err = Config::from_env_only().unwrap_err();
    assert!(err.to_string().contains("timeline"));

    clear_env();
    unsafe {
        env::set_var("SYNC_FALLBACK_INTERVAL_SECS", "0");
    }
    assert!(Config::from_env_only().is_err());

    clear_env();
}

#[test]
#[serial]
fn test_config_from_file() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "SUBSCRIPTION_BUFFER=32").unwrap();
    writeln!(file, "TIMELINE_START_HOUR=0").unwrap();
    writeln!(file, "TIMELINE_END_HOUR=24").unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.subscription_buffer, 32);
    assert_eq!(config.timeline_axis().unwrap().span(), 24.0);

    assert!(Config::from_file("/nonexistent/shiftcal.env").is_err());
    clear_env();
}

#[test]
fn test_test_config_is_valid() {
    let config = Config::test_config().unwrap();
    config.validate().unwrap();
    assert_eq!(config.sync_fallback_interval(), Duration::from_secs(1));
}
