use crate::report::influx_reporter_base::InfluxReporterBase;
use crate::report::ReportCollector;
use gatling_influx_core::prelude::{DelegatedShutdownListener, RunIdentity};
use gatling_influx_log_model::MetricEvent;
use influxdb::{Client, WriteQuery};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::select;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Where and how to reach InfluxDB.
#[derive(Debug, Clone)]
pub struct InfluxClientConfig {
    pub url: String,
    /// The bucket, or the database on InfluxDB 1.x.
    pub bucket: String,
    /// API token for InfluxDB 2.x.
    pub token: Option<String>,
    /// Username and password for InfluxDB 1.x.
    pub credentials: Option<(String, String)>,
}

impl InfluxClientConfig {
    fn client(&self) -> Client {
        let mut client = Client::new(self.url.clone(), self.bucket.clone());
        if let Some((username, password)) = &self.credentials {
            client = client.with_auth(username, password);
        }
        if let Some(token) = &self.token {
            client = client.with_token(token);
        }
        client
    }
}

/// Write points directly to InfluxDB using the InfluxDB client.
///
/// Points are sent one at a time from a background task so that a slow database never holds up
/// the log tailer. When running on many load generators it can be preferable to use the
/// [InfluxFileReportCollector](crate::report::InfluxFileReportCollector) and ship the files with
/// Telegraf instead.
pub struct InfluxClientReportCollector {
    inner: InfluxReporterBase,
}

impl InfluxClientReportCollector {
    pub fn new(
        runtime: &Handle,
        shutdown_listener: DelegatedShutdownListener,
        identity: RunIdentity,
        config: InfluxClientConfig,
    ) -> Self {
        let flush_complete = Arc::new(AtomicBool::new(false));
        let (join_handle, writer) = start_metrics_write_task(
            runtime,
            shutdown_listener,
            config.client(),
            flush_complete.clone(),
        );

        Self {
            inner: InfluxReporterBase::new(identity, join_handle, writer, flush_complete),
        }
    }
}

impl ReportCollector for InfluxClientReportCollector {
    fn add_event(&mut self, event: &MetricEvent) {
        self.inner.add_event(event);
    }

    fn finalize(&self) {
        self.inner.finalize();
    }
}

fn start_metrics_write_task(
    runtime: &Handle,
    mut shutdown_listener: DelegatedShutdownListener,
    client: Client,
    flush_complete: Arc<AtomicBool>,
) -> (JoinHandle<()>, UnboundedSender<WriteQuery>) {
    let (writer, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    let join_handle = runtime.spawn(async move {
        loop {
            select! {
                _ = shutdown_listener.wait_for_shutdown() => {
                    log::debug!("Shutting down metrics reporter");
                    break;
                }
                query = receiver.recv() => {
                    if let Some(query) = query {
                        if let Err(e) = client.query(query).await {
                            log::warn!("Failed to send metric to InfluxDB: {}", e);
                        }
                    } else {
                        break;
                    }
                }
            }
        }

        log::debug!("Draining any remaining metrics before shutting down...");
        let mut drain_count = 0;

        // Drain remaining metrics before shutting down
        while let Ok(query) = receiver.try_recv() {
            if let Err(e) = client.query(query).await {
                log::warn!("Failed to send metric to InfluxDB: {}", e);
            }
            drain_count += 1;

            if drain_count % 1000 == 0 {
                log::debug!("Drained {} remaining metrics", drain_count);
            }
        }

        log::debug!("Drained {} remaining metrics", drain_count);

        flush_complete.store(true, Ordering::Relaxed);
    });

    (join_handle, writer)
}
