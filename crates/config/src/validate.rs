//! Startup validation. Problems are collected so one run reports all of them.

use std::net::SocketAddr;

use secrecy::ExposeSecret;

use crate::{
    error::{Error, Result},
    schema::MqtgConfig,
};

pub fn validate(config: &MqtgConfig) -> Result<()> {
    let mut problems = Vec::new();

    if config.telegram.token.expose_secret().trim().is_empty() {
        problems.push("telegram.token is required".to_string());
    }
    if config.bridge.max_message_age_secs < 0 {
        problems.push("bridge.max_message_age_secs must be >= 0".to_string());
    }
    if config.bridge.events_queue_capacity == 0 {
        problems.push("bridge.events_queue_capacity must be > 0".to_string());
    }
    if config.bridge.chat_queue_capacity == 0 {
        problems.push("bridge.chat_queue_capacity must be > 0".to_string());
    }
    if config.mqtt.keep_alive_secs == 0 {
        problems.push("mqtt.keep_alive_secs must be > 0".to_string());
    }
    if config.mqtt.connect_timeout_secs == 0 {
        problems.push("mqtt.connect_timeout_secs must be > 0".to_string());
    }
    if config.mqtt.max_reconnect_interval_secs == 0 {
        problems.push("mqtt.max_reconnect_interval_secs must be > 0".to_string());
    }
    if config.history.max_records < 0 {
        problems.push("history.max_records must be >= 0".to_string());
    }
    if config.export.max_concurrent == 0 {
        problems.push("export.max_concurrent must be > 0".to_string());
    }
    if config.export.queue_capacity == 0 {
        problems.push("export.queue_capacity must be > 0".to_string());
    }
    if config.database.url.trim().is_empty() {
        problems.push("database.url must not be empty".to_string());
    }
    if config.metrics.enabled && config.metrics.listen.parse::<SocketAddr>().is_err() {
        problems.push(format!(
            "metrics.listen must be a socket address, got {:?}",
            config.metrics.listen
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::Invalid { problems })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    fn valid() -> MqtgConfig {
        let mut cfg = MqtgConfig::default();
        cfg.telegram.token = Secret::new("123:abc".into());
        cfg
    }

    #[test]
    fn defaults_with_token_are_valid() {
        validate(&valid()).unwrap();
    }

    #[test]
    fn missing_token_is_reported() {
        let err = validate(&MqtgConfig::default()).unwrap_err();
        assert!(err.to_string().contains("telegram.token"));
    }

    #[test]
    fn all_problems_are_aggregated() {
        let mut cfg = valid();
        cfg.export.max_concurrent = 0;
        cfg.mqtt.keep_alive_secs = 0;
        let Error::Invalid { problems } = validate(&cfg).unwrap_err() else {
            panic!("expected Invalid");
        };
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut cfg = valid();
        cfg.metrics.listen = "not an address".into();
        validate(&cfg).unwrap();

        cfg.metrics.enabled = true;
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("metrics.listen"));
    }
}
