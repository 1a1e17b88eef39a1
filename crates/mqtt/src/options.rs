use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {mqtg_config::MqttConfig, rumqttc::MqttOptions, url::Url};

use crate::error::ConnectError;

const PLAIN_PORT: u16 = 1883;
const TLS_PORT: u16 = 8883;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Tls,
}

/// A parsed `scheme://[user[:password]@]host[:port]` broker address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerUrl {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BrokerUrl {
    pub fn parse(raw: &str) -> Result<Self, ConnectError> {
        let url = Url::parse(raw.trim())?;
        let transport = match url.scheme() {
            "tcp" | "mqtt" => Transport::Tcp,
            "ssl" | "tls" | "mqtts" => Transport::Tls,
            other => return Err(ConnectError::UnsupportedScheme(other.to_string())),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(ConnectError::MissingHost)?
            .to_string();
        let port = url.port().unwrap_or(match transport {
            Transport::Tcp => PLAIN_PORT,
            Transport::Tls => TLS_PORT,
        });
        let username = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(decode);
        let password = url.password().map(decode);

        Ok(Self {
            transport,
            host,
            port,
            username,
            password,
        })
    }

    /// Build client options for this broker.
    pub fn to_options(&self, config: &MqttConfig, client_id: &str) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(config.clean_session);
        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.as_deref().unwrap_or_default());
        }
        if self.transport == Transport::Tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        options
    }
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Connections opened by this process, used to tell apart default client
/// ids generated within the same second.
static CONNECTION_SEQ: AtomicU64 = AtomicU64::new(0);

/// The configured client id, or `mqtg-<unix seconds>-<sequence>`.
pub fn client_id(config: &MqttConfig) -> String {
    match &config.client_id {
        Some(id) if !id.is_empty() => id.clone(),
        _ => {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            let seq = CONNECTION_SEQ.fetch_add(1, Ordering::Relaxed);
            format!("mqtg-{secs}-{seq}")
        },
    }
}
