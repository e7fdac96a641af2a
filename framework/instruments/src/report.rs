mod in_memory_reporter;
mod influx_client_reporter;
mod influx_file_reporter;
mod influx_reporter_base;
mod point;

use std::path::PathBuf;

use gatling_influx_core::prelude::{DelegatedShutdownListener, RunIdentity};
use gatling_influx_log_model::MetricEvent;
use parking_lot::Mutex;
use tokio::runtime::Handle;

pub use in_memory_reporter::InMemoryReporter;
pub use influx_client_reporter::{InfluxClientConfig, InfluxClientReportCollector};
pub use influx_file_reporter::InfluxFileReportCollector;

/// Intake for parsed events.
///
/// Events arrive one at a time, in the order they were read from the log. Implementations must
/// not block for long in [ReportCollector::add_event], anything slow belongs in a background task.
pub trait ReportCollector {
    fn add_event(&mut self, event: &MetricEvent);

    /// Called once after the last event. Waits for buffered events to be written out.
    fn finalize(&self);
}

/// Fans every event out to the enabled collectors.
pub struct Reporter {
    collectors: Mutex<Vec<Box<dyn ReportCollector + Send>>>,
}

impl Reporter {
    pub fn new(collectors: Vec<Box<dyn ReportCollector + Send>>) -> Self {
        Self {
            collectors: Mutex::new(collectors),
        }
    }

    pub fn add_event(&self, event: &MetricEvent) {
        for collector in self.collectors.lock().iter_mut() {
            collector.add_event(event);
        }
    }

    /// Blocks until every collector has flushed, call from a blocking context.
    pub fn finalize(&self) {
        for collector in self.collectors.lock().iter() {
            collector.finalize();
        }
    }
}

/// Selects which collectors a [Reporter] is made of.
pub struct ReportConfig {
    identity: RunIdentity,
    enable_in_memory: bool,
    influx_client: Option<InfluxClientConfig>,
    influx_file_dir: Option<PathBuf>,
}

impl ReportConfig {
    pub fn new(identity: RunIdentity) -> Self {
        Self {
            identity,
            enable_in_memory: false,
            influx_client: None,
            influx_file_dir: None,
        }
    }

    /// Keep counts in memory and print a summary table when the run finishes.
    pub fn enable_in_memory(mut self) -> Self {
        self.enable_in_memory = true;
        self
    }

    /// Send points straight to InfluxDB.
    pub fn enable_influx_client(mut self, config: InfluxClientConfig) -> Self {
        self.influx_client = Some(config);
        self
    }

    /// Write points in line protocol to a file in `dir`, to be shipped by Telegraf.
    pub fn enable_influx_file(mut self, dir: PathBuf) -> Self {
        self.influx_file_dir = Some(dir);
        self
    }

    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Build the reporter. Background write tasks are spawned on `runtime` and keep running until
    /// `shutdown_listener` fires, then drain whatever is still queued.
    pub fn init_reporter(
        self,
        runtime: &Handle,
        shutdown_listener: DelegatedShutdownListener,
    ) -> anyhow::Result<Reporter> {
        let mut collectors: Vec<Box<dyn ReportCollector + Send>> = Vec::new();

        if let Some(config) = self.influx_client {
            log::info!(
                "Reporting to InfluxDB at {} in bucket {}",
                config.url,
                config.bucket
            );
            collectors.push(Box::new(InfluxClientReportCollector::new(
                runtime,
                shutdown_listener.clone(),
                self.identity.clone(),
                config,
            )));
        }

        if let Some(dir) = self.influx_file_dir {
            log::info!("Writing InfluxDB line protocol to {}", dir.display());
            collectors.push(Box::new(InfluxFileReportCollector::new(
                runtime,
                shutdown_listener.clone(),
                self.identity.clone(),
                dir,
            )));
        }

        if self.enable_in_memory {
            collectors.push(Box::new(InMemoryReporter::new()));
        }

        if collectors.is_empty() {
            anyhow::bail!("No reporter enabled, parsed events would be discarded");
        }

        Ok(Reporter::new(collectors))
    }
}
