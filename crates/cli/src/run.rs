//! Process wiring: storage, broker connector, chat platform, dispatcher.

use std::{net::SocketAddr, sync::Arc};

use {
    metrics_exporter_prometheus::PrometheusBuilder,
    mqtg_bridge::{Dispatcher, ExportQueue, MenuSessions, Services, SubscriptionRef, UserDirectory},
    mqtg_config::{MetricsConfig, MqtgConfig},
    mqtg_mqtt::MqttConnector,
    mqtg_store::SqliteStore,
    mqtg_telegram::TelegramPlatform,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::db_commands::open_pool;

pub async fn run_bridge(config: MqtgConfig) -> anyhow::Result<()> {
    mqtg_config::validate(&config)?;
    init_metrics(&config.metrics)?;
    let config = Arc::new(config);

    let pool = open_pool(&config.database.url).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let (bus_tx, bus_rx) = mpsc::channel(config.bridge.events_queue_capacity);
    let (chat_tx, chat_rx) = mpsc::channel(config.bridge.chat_queue_capacity);

    let bot = mqtg_telegram::build_bot(&config.telegram)?;
    let platform = Arc::new(TelegramPlatform::new(bot.clone()));
    let connector = Arc::new(MqttConnector::<SubscriptionRef>::new(
        config.mqtt.clone(),
        bus_tx,
    ));

    let services = Arc::new(Services {
        config: Arc::clone(&config),
        store: Arc::clone(&store) as _,
        connector: connector as _,
        platform: Arc::clone(&platform) as _,
        sessions: Arc::new(MenuSessions),
    });
    let directory = Arc::new(UserDirectory::new(Arc::clone(&services)));
    let (exports, export_worker) =
        ExportQueue::start(&config.export, Arc::clone(&store) as _, platform as _);

    directory.reconnect_all().await?;

    let cancel = CancellationToken::new();
    let poller = mqtg_telegram::start_polling(bot, chat_tx, cancel.clone()).await?;
    let dispatcher = Dispatcher::new(services, Arc::clone(&directory), exports, bus_rx, chat_rx);
    let dispatch = tokio::spawn(dispatcher.run(cancel.clone()));

    info!("mqtg running, press Ctrl+C to stop");
    shutdown_signal().await;
    info!("shutting down");

    cancel.cancel();
    for (name, task) in [("telegram poller", poller), ("dispatcher", dispatch)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "task ended abnormally");
        }
    }
    directory.shutdown_all().await;
    // Running exports finish on their own; queued ones are dropped.
    export_worker.abort();
    Ok(())
}

/// Install the Prometheus exporter and its scrape endpoint. Without it
/// every recorded metric is a no-op.
fn init_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(());
    }
    let listen: SocketAddr = config.listen.parse()?;
    let mut builder = PrometheusBuilder::new().with_http_listener(listen);
    for (key, value) in &config.labels {
        builder = builder.add_global_label(key, value);
    }
    builder.install()?;
    info!(%listen, "prometheus metrics exporter listening");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_metrics_install_nothing() {
        let config = MetricsConfig {
            listen: "not an address".into(),
            ..Default::default()
        };
        init_metrics(&config).unwrap();
    }

    #[test]
    fn enabled_metrics_need_a_socket_address() {
        let config = MetricsConfig {
            enabled: true,
            listen: "localhost".into(),
            ..Default::default()
        };
        assert!(init_metrics(&config).is_err());
    }
}
