use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::MqtgConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["mqtg.toml", "mqtg.yaml", "mqtg.yml", "mqtg.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<MqtgConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Build the process configuration.
///
/// An explicit path must exist and parse. Without one, the standard
/// locations are searched (`./mqtg.*`, then `~/.config/mqtg/mqtg.*`) and a
/// missing file means defaults. Legacy environment variables are applied
/// last in both cases.
pub fn discover_and_load(explicit: Option<&Path>) -> Result<MqtgConfig> {
    let mut config = match explicit {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(path)?
        },
        None => match find_config_file() {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                load_config(&path)?
            },
            None => {
                debug!("no config file found, using defaults");
                MqtgConfig::default()
            },
        },
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Returns the user-global config directory (`~/.config/mqtg/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "mqtg").map(|d| d.config_dir().to_path_buf())
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

fn parse_config(raw: &str, path: &Path) -> Result<MqtgConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

/// Apply the flat environment variables older deployments were configured
/// with. Unparseable values are ignored and the file/default value is kept.
pub fn apply_env_overrides(config: &mut MqtgConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut MqtgConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(token) = lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.is_empty()) {
        config.telegram.token = Secret::new(token);
    }
    if let Some(raw) = lookup("TELEGRAM_MAX_MESSAGE_AGE") {
        match raw.trim().parse::<i64>() {
            Ok(age) => config.bridge.max_message_age_secs = age,
            Err(e) => warn!(value = %raw, error = %e, "ignoring TELEGRAM_MAX_MESSAGE_AGE"),
        }
    }
    if let Some(raw) = lookup("MQTT_CLEAN_SESSION") {
        config.mqtt.clean_session = raw == "true";
    }
    if let Some(raw) = lookup("MQTT_KEEPALIVE") {
        match raw.trim().parse::<u64>() {
            Ok(secs) => config.mqtt.keep_alive_secs = secs,
            Err(e) => warn!(value = %raw, error = %e, "ignoring MQTT_KEEPALIVE"),
        }
    }
    if let Some(id) = lookup("MQTT_CLIENT_ID").filter(|id| !id.is_empty()) {
        config.mqtt.client_id = Some(id);
    }
    if let Some(raw) = lookup("AUTHORIZED_USERS") {
        config.telegram.allowlist = parse_allowlist(&raw);
    }
    if let Some(raw) = lookup("MAX_SUB_DATA_COUNT") {
        match raw.trim().parse::<i64>() {
            Ok(max) => config.history.max_records = max,
            Err(e) => warn!(value = %raw, error = %e, "ignoring MAX_SUB_DATA_COUNT"),
        }
    }
    if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
        config.database.url = url;
    }
}

/// Split a comma-separated list of numeric Telegram user ids.
fn parse_allowlist(raw: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.parse::<i64>() {
            Ok(id) => ids.push(id.to_string()),
            Err(e) => warn!(entry, error = %e, "skipping invalid AUTHORIZED_USERS entry"),
        }
    }
    if ids.is_empty() {
        warn!("AUTHORIZED_USERS is set but contains no valid ids, allowing everyone");
    }
    ids
}
