use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use gatling_influx_core::prelude::{RunIdentity, ShutdownHandle};
use gatling_influx_instruments::{InfluxClientConfig, ReportConfig};
use sysinfo::System;

use crate::cli::{RelayCli, ReporterOpt};
use crate::pipeline::run_pipeline;
use crate::resolver::{DirectoryResolver, Lookup};
use crate::shutdown::start_shutdown_listener;
use crate::tailer::{TailConfig, TailOutcome};

/// Everything needed to relay one run, fixed before any lookup starts.
pub struct RelayDefinition {
    pub target_dir: PathBuf,
    pub tail: TailConfig,
    pub report: ReportConfig,
}

impl RelayDefinition {
    pub fn from_cli(cli: RelayCli, started_at: SystemTime) -> anyhow::Result<Self> {
        let node_name = match cli.node_name {
            Some(node_name) => node_name,
            None => System::host_name().context(
                "Failed to determine the host name, set one with --node-name",
            )?,
        };

        let identity = RunIdentity::new(node_name, started_at)
            .with_system_under_test(cli.system_under_test)
            .with_test_environment(cli.test_environment);

        let mut report = ReportConfig::new(identity);
        report = match cli.reporter {
            ReporterOpt::InfluxClient => report.enable_influx_client(InfluxClientConfig {
                url: cli.influx_url,
                bucket: cli.influx_bucket,
                token: cli.influx_token,
                credentials: cli.influx_username.zip(cli.influx_password),
            }),
            ReporterOpt::InfluxFile => report.enable_influx_file(cli.metrics_dir),
            ReporterOpt::InMemory => report.enable_in_memory(),
        };
        if cli.summary && cli.reporter != ReporterOpt::InMemory {
            report = report.enable_in_memory();
        }

        Ok(Self {
            target_dir: cli.target_dir,
            tail: TailConfig::new(Duration::from_secs(cli.stop_timeout)),
            report,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Stopped before the log of the run was found.
    StoppedDuringLookup,
    Finished(TailOutcome),
}

/// Find the log of the current run and relay it until it goes idle or `shutdown_handle` fires.
pub async fn relay(
    definition: RelayDefinition,
    shutdown_handle: &ShutdownHandle,
) -> anyhow::Result<RelayOutcome> {
    let identity = definition.report.identity();
    log::info!(
        "Relaying Gatling results from {} as node {}",
        definition.target_dir.display(),
        identity.node_name()
    );

    let mut resolver =
        DirectoryResolver::new(identity.started_at(), shutdown_handle.new_listener());
    let location = match resolver.resolve(&definition.target_dir).await? {
        Lookup::Found(location) => location,
        Lookup::StoppedByUser => return Ok(RelayOutcome::StoppedDuringLookup),
    };

    let outcome = run_pipeline(
        &location.log_file,
        definition.tail,
        definition.report,
        shutdown_handle.new_listener(),
    )
    .await?;

    Ok(RelayOutcome::Finished(outcome))
}

pub fn run(cli: RelayCli) -> anyhow::Result<()> {
    let definition = RelayDefinition::from_cli(cli, SystemTime::now())?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(runtime.handle());

    match runtime.block_on(relay(definition, &shutdown_handle))? {
        RelayOutcome::StoppedDuringLookup => {
            log::info!("Stopped before the simulation log was found");
        }
        RelayOutcome::Finished(TailOutcome::IdleTimeout) => {
            log::info!("Simulation log went idle, relay finished");
        }
        RelayOutcome::Finished(TailOutcome::Stopped) => {
            log::info!("Relay stopped");
        }
        RelayOutcome::Finished(TailOutcome::Fatal(reason)) => {
            anyhow::bail!("Relay failed: {reason}");
        }
    }

    Ok(())
}
