use crate::report::influx_reporter_base::InfluxReporterBase;
use crate::report::ReportCollector;
use anyhow::Context;
use gatling_influx_core::prelude::{DelegatedShutdownListener, RunIdentity};
use gatling_influx_log_model::MetricEvent;
use influxdb::{Query, WriteQuery};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::runtime::Handle;
use tokio::select;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Write points to disk in the InfluxDB line protocol format.
/// Metrics can then be sent to InfluxDB by Telegraf.
///
/// One file is created per run, named after the node and the time the relay started.
pub struct InfluxFileReportCollector {
    inner: InfluxReporterBase,
}

impl InfluxFileReportCollector {
    pub fn new(
        runtime: &Handle,
        shutdown_listener: DelegatedShutdownListener,
        identity: RunIdentity,
        dir: PathBuf,
    ) -> Self {
        let flush_complete = Arc::new(AtomicBool::new(false));
        let file_path = dir.join(metrics_file_name(&identity));
        let (join_handle, writer) = start_metrics_file_write_task(
            runtime,
            shutdown_listener,
            file_path,
            flush_complete.clone(),
        );

        Self {
            inner: InfluxReporterBase::new(identity, join_handle, writer, flush_complete),
        }
    }
}

impl ReportCollector for InfluxFileReportCollector {
    fn add_event(&mut self, event: &MetricEvent) {
        self.inner.add_event(event);
    }

    fn finalize(&self) {
        self.inner.finalize();
    }
}

fn metrics_file_name(identity: &RunIdentity) -> String {
    let started_at = identity
        .started_at()
        .duration_since(UNIX_EPOCH)
        .map(|since_epoch| since_epoch.as_secs())
        .unwrap_or_default();
    format!("{}-{}.influx", identity.node_name(), started_at)
}

fn start_metrics_file_write_task(
    runtime: &Handle,
    shutdown_listener: DelegatedShutdownListener,
    file_path: PathBuf,
    flush_complete: Arc<AtomicBool>,
) -> (JoinHandle<()>, UnboundedSender<WriteQuery>) {
    let (writer, receiver) = tokio::sync::mpsc::unbounded_channel();
    let join_handle = runtime.spawn(async move {
        if let Err(e) = write_until_shutdown(shutdown_listener, &file_path, receiver).await {
            log::error!(
                "Influx file reporter stopped writing to {}: {:?}",
                file_path.display(),
                e
            );
        }

        // Signal the 'finalize' method that the write task has finished.
        flush_complete.store(true, Ordering::Relaxed);
    });

    (join_handle, writer)
}

async fn write_until_shutdown(
    mut shutdown_listener: DelegatedShutdownListener,
    file_path: &Path,
    mut receiver: UnboundedReceiver<WriteQuery>,
) -> anyhow::Result<()> {
    if let Some(dir) = file_path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create metrics directory {}", dir.display()))?;
    }

    let file = File::options()
        .create_new(true)
        .write(true)
        .open(file_path)
        .await
        .with_context(|| format!("Failed to create metrics file {}", file_path.display()))?;
    let mut file = BufWriter::new(file);

    // Listen and write metrics until shutdown
    loop {
        select! {
            _ = shutdown_listener.wait_for_shutdown() => {
                log::debug!("Shutting down influx file reporter");
                break;
            }
            query = receiver.recv() => {
                if let Some(query) = query {
                    write_query(&mut file, query).await?;
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
        write_query(&mut file, query).await?;
        drain_count += 1;

        if drain_count % 1000 == 0 {
            log::debug!("Drained {} remaining metrics", drain_count);
        }
    }

    // Ensure everything that's buffered has been written to disk.
    file.flush().await?;

    log::debug!("Drained {} remaining metrics", drain_count);

    Ok(())
}

#[inline]
async fn write_query<W>(writer: &mut W, query: WriteQuery) -> anyhow::Result<()>
where
    W: AsyncWriteExt + Unpin + Debug,
{
    let query_str = query.build()?.get();
    writer.write_all(query_str.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    Ok(())
}
