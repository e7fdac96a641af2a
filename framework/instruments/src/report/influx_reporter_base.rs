use crate::report::point::event_query;
use crate::report::ReportCollector;

use gatling_influx_core::prelude::RunIdentity;
use gatling_influx_log_model::MetricEvent;
use influxdb::WriteQuery;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(100);
const FLUSH_NOTIFY_INTERVAL: Duration = Duration::from_secs(10);

/// Shared front half of the InfluxDB reporters.
///
/// Turns events into points and queues them for a background write task. The write task owns
/// the actual destination and sets `flush_complete` once it has drained the queue.
pub(crate) struct InfluxReporterBase {
    identity: RunIdentity,
    simulation: Option<String>,
    join_handle: JoinHandle<()>,
    writer: UnboundedSender<WriteQuery>,
    flush_complete: Arc<AtomicBool>,
}

impl InfluxReporterBase {
    pub fn new(
        identity: RunIdentity,
        join_handle: JoinHandle<()>,
        writer: UnboundedSender<WriteQuery>,
        flush_complete: Arc<AtomicBool>,
    ) -> Self {
        Self {
            identity,
            simulation: None,
            join_handle,
            writer,
            flush_complete,
        }
    }

    fn try_send(&self, query: WriteQuery) {
        if let Err(e) = self.writer.send(query) {
            if self.flush_complete.load(Ordering::Relaxed) {
                log::info!(
                    "Failed to record metric because the write task has finished: {}",
                    e
                );
            } else {
                log::warn!("Failed to record metric: {}", e);
            }
        }
    }
}

impl ReportCollector for InfluxReporterBase {
    fn add_event(&mut self, event: &MetricEvent) {
        if let MetricEvent::Run(run) = event {
            self.simulation = Some(run.simulation_name.clone());
        }

        let query = event_query(&self.identity, self.simulation.as_deref(), event);
        self.try_send(query);
    }

    fn finalize(&self) {
        let wait_started = Instant::now();
        let mut notify_timer = Instant::now();
        while !self.flush_complete.load(Ordering::Relaxed) {
            if notify_timer.elapsed() > FLUSH_NOTIFY_INTERVAL {
                log::warn!(
                    "Still waiting for metrics to flush after {} seconds.",
                    wait_started.elapsed().as_secs()
                );
                notify_timer = Instant::now();
            }

            // If the write task has exited then there's no point trying to wait for it to finish
            // any longer.
            if self.join_handle.is_finished() {
                break;
            }

            std::thread::sleep(FLUSH_POLL_INTERVAL);
        }

        log::debug!(
            "Metrics flushed after {} seconds",
            wait_started.elapsed().as_secs()
        );
    }
}
