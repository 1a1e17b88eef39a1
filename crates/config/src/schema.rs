use std::collections::HashMap;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration, assembled once at startup and shared read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MqtgConfig {
    pub telegram: TelegramConfig,
    pub bridge: BridgeConfig,
    pub mqtt: MqttConfig,
    pub history: HistoryConfig,
    pub export: ExportConfig,
    pub database: DatabaseConfig,
    pub metrics: MetricsConfig,
}

/// Telegram bot account settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Telegram user ids or usernames allowed to talk to the bot.
    /// Empty means everyone.
    pub allowlist: Vec<String>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("allowlist", &self.allowlist)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            allowlist: Vec::new(),
        }
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Dispatch loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Chat events older than this many seconds are dropped on arrival.
    pub max_message_age_secs: i64,
    /// Capacity of the shared bus-events queue.
    pub events_queue_capacity: usize,
    /// Capacity of the chat-events queue fed by the Telegram poller.
    pub chat_queue_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_message_age_secs: 30,
            events_queue_capacity: 1024,
            chat_queue_capacity: 256,
        }
    }
}

/// Broker connection settings applied to every per-user connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// When false the broker keeps queued messages across reconnects.
    pub clean_session: bool,
    pub keep_alive_secs: u64,
    /// Fixed client id. Defaults to `mqtg-<unix seconds>` per connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Bounded wait for the initial CONNACK.
    pub connect_timeout_secs: u64,
    /// Ceiling for the reconnect backoff.
    pub max_reconnect_interval_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            clean_session: false,
            keep_alive_secs: 60,
            client_id: None,
            connect_timeout_secs: 10,
            max_reconnect_interval_secs: 60,
        }
    }
}

/// History retention.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Highest number of history rows kept (0 = unlimited).
    pub max_records: i64,
}

/// CSV export workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Exports running at the same time.
    pub max_concurrent: usize,
    /// Pending export requests before new ones are rejected.
    pub queue_capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            queue_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://mqtg.db?mode=rwc".into(),
        }
    }
}

/// Prometheus metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus exporter.
    pub enabled: bool,
    /// Address of the scrape endpoint.
    pub listen: String,
    /// Additional labels to add to all metrics.
    pub labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1:9464".into(),
            labels: HashMap::new(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = MqtgConfig::default();
        assert_eq!(cfg.bridge.max_message_age_secs, 30);
        assert!(!cfg.mqtt.clean_session);
        assert_eq!(cfg.mqtt.keep_alive_secs, 60);
        assert_eq!(cfg.mqtt.connect_timeout_secs, 10);
        assert_eq!(cfg.mqtt.max_reconnect_interval_secs, 60);
        assert!(cfg.mqtt.client_id.is_none());
        assert!(cfg.telegram.allowlist.is_empty());
        assert_eq!(cfg.history.max_records, 0);
        assert!(!cfg.metrics.enabled);
        assert_eq!(cfg.metrics.listen, "127.0.0.1:9464");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let raw = r#"
            [telegram]
            token = "123:ABC"
            allowlist = ["42"]

            [mqtt]
            clean_session = true

            [metrics]
            enabled = true
            labels = { instance = "home" }
        "#;
        let cfg: MqtgConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.telegram.token.expose_secret(), "123:ABC");
        assert_eq!(cfg.telegram.allowlist, vec!["42"]);
        assert!(cfg.mqtt.clean_session);
        assert_eq!(cfg.mqtt.keep_alive_secs, 60);
        assert_eq!(cfg.bridge.chat_queue_capacity, 256);
        assert!(cfg.metrics.enabled);
        assert_eq!(cfg.metrics.labels["instance"], "home");
        assert_eq!(cfg.metrics.listen, "127.0.0.1:9464");
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = TelegramConfig {
            token: Secret::new("very-secret".into()),
            ..Default::default()
        };
        let printed = format!("{cfg:?}");
        assert!(!printed.contains("very-secret"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[test]
    fn serialize_roundtrip_keeps_token() {
        let mut cfg = MqtgConfig::default();
        cfg.telegram.token = Secret::new("tok".into());
        let json = serde_json::to_string(&cfg).unwrap();
        let back: MqtgConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.telegram.token.expose_secret(), "tok");
    }
}
