//! History export to CSV, off the dispatch loop.

use std::{io::Write, sync::Arc};

use {
    chrono::Local,
    mqtg_config::ExportConfig,
    mqtg_store::{DataType, HistoryRecord, HistoryStore},
    tokio::{
        sync::{Semaphore, mpsc},
        task::JoinHandle,
    },
    tracing::{error, info, warn},
};

use crate::{
    chat::ChatPlatform,
    error::Result,
    metrics::{self as bridge_metrics, counter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportRequest {
    pub chat_id: i64,
    pub subscription_id: i64,
}

/// Bounded queue of export jobs served by a limited number of workers.
#[derive(Clone)]
pub struct ExportQueue {
    tx: mpsc::Sender<ExportRequest>,
}

impl ExportQueue {
    /// Start the export worker. Jobs keep running after the dispatcher
    /// stops; the worker ends once every queue handle is dropped.
    pub fn start(
        config: &ExportConfig,
        store: Arc<dyn HistoryStore>,
        platform: Arc<dyn ChatPlatform>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let worker = tokio::spawn(run_worker(rx, permits, store, platform));
        (Self { tx }, worker)
    }

    /// Queue a job without waiting. Returns false when the job was dropped.
    pub fn submit(&self, request: ExportRequest) -> bool {
        let result = self.tx.try_send(request);
        let label = if result.is_ok() { "accepted" } else { "dropped" };
        counter!(bridge_metrics::EXPORT_REQUESTS_TOTAL, "result" => label).increment(1);
        match result {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    chat_id = request.chat_id,
                    subscription_id = request.subscription_id,
                    "export queue full, request dropped"
                );
                false
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("export worker stopped, request dropped");
                false
            },
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<ExportRequest>,
    permits: Arc<Semaphore>,
    store: Arc<dyn HistoryStore>,
    platform: Arc<dyn ChatPlatform>,
) {
    while let Some(request) = rx.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let store = Arc::clone(&store);
        let platform = Arc::clone(&platform);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = export_subscription(store.as_ref(), platform.as_ref(), request).await {
                error!(
                    chat_id = request.chat_id,
                    subscription_id = request.subscription_id,
                    error = %e,
                    "export failed"
                );
            }
        });
    }
}

/// Write the history of one subscription to a temporary CSV file and send
/// it to the requesting chat. The file is removed afterwards.
pub async fn export_subscription(
    store: &dyn HistoryStore,
    platform: &dyn ChatPlatform,
    request: ExportRequest,
) -> Result<()> {
    let ExportRequest {
        chat_id,
        subscription_id,
    } = request;
    let rows = store.history_for(subscription_id).await?;

    let mut artifact = tempfile::NamedTempFile::new()?;
    write_csv(&rows, artifact.as_file_mut())?;
    let bytes = tokio::fs::read(artifact.path()).await?;

    platform
        .send_document(
            chat_id,
            &format!("export_{subscription_id}.csv"),
            &format!("History of subscription #{subscription_id}"),
            bytes,
        )
        .await?;
    info!(chat_id, subscription_id, rows = rows.len(), "history exported");
    Ok(())
}

/// Render history rows as `Date,ID,Message`, oldest first.
pub fn write_csv<W: Write>(rows: &[HistoryRecord], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["Date", "ID", "Message"])?;
    for row in rows {
        let date = row
            .created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let message = match row.data_type {
            DataType::Image => format!("[image, {} bytes]", row.payload.len()),
            DataType::Other => String::from_utf8_lossy(&row.payload).into_owned(),
        };
        writer.write_record([date, row.subscription_id.to_string(), message])?;
    }
    writer.flush()?;
    Ok(())
}
