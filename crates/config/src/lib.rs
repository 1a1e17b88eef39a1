//! Configuration loading, validation, env substitution, and legacy env overrides.
//!
//! Config files: `mqtg.toml`, `mqtg.yaml`, or `mqtg.json`
//! Searched in `./` then `~/.config/mqtg/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values. The flat
//! environment variables of older deployments (`MQTT_KEEPALIVE`,
//! `AUTHORIZED_USERS`, ...) are applied on top of whatever the file says.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        BridgeConfig, DatabaseConfig, ExportConfig, HistoryConfig, MetricsConfig, MqttConfig,
        MqtgConfig, TelegramConfig,
    },
    validate::validate,
};
