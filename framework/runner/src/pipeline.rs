use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use gatling_influx_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use gatling_influx_instruments::{ReportConfig, Reporter};
use gatling_influx_log_model::LogParser;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::runtime::Handle;
use tokio::select;
use tokio::sync::oneshot;

use crate::tailer::{TailConfig, TailOutcome, Tailer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum PipelineState {
    #[display("running")]
    Running,
    #[display("draining tailer")]
    DrainingTailer,
    #[display("draining sink")]
    DrainingSink,
    #[display("stopped")]
    Stopped,
}

impl PipelineState {
    /// The state that follows this one, shutdown only ever moves forward.
    pub fn next(self) -> Option<Self> {
        match self {
            PipelineState::Running => Some(PipelineState::DrainingTailer),
            PipelineState::DrainingTailer => Some(PipelineState::DrainingSink),
            PipelineState::DrainingSink => Some(PipelineState::Stopped),
            PipelineState::Stopped => None,
        }
    }
}

/// Tails a log into a reporter and shuts both down in order.
///
/// The tailer always finishes before the reporter's write tasks are told to stop, so every line
/// that was read ends up in the reporter.
pub struct Pipeline {
    reporter: Arc<Reporter>,
    sink_shutdown: ShutdownHandle,
    tail: TailConfig,
    state: PipelineState,
}

impl Pipeline {
    /// `sink_shutdown` must be the handle whose listeners were given to the reporter's write
    /// tasks.
    pub fn new(reporter: Reporter, sink_shutdown: ShutdownHandle, tail: TailConfig) -> Self {
        Self {
            reporter: Arc::new(reporter),
            sink_shutdown,
            tail,
            state: PipelineState::Running,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            log::info!("Pipeline {} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Run until the tailer finishes on its own or `stop` fires, then drain.
    pub async fn run<B>(
        mut self,
        reader: B,
        mut stop: DelegatedShutdownListener,
    ) -> anyhow::Result<TailOutcome>
    where
        B: AsyncBufRead + Unpin + Send + 'static,
    {
        log::info!("Pipeline {}", self.state);

        let tailer_shutdown = ShutdownHandle::new();
        let (done_tx, mut done_rx) = oneshot::channel();
        let tailer = Tailer::new(reader, LogParser::new(), self.reporter.clone(), self.tail);
        let tailer_task = tokio::spawn(tailer.run(tailer_shutdown.new_listener(), done_tx));

        let finished = select! {
            outcome = &mut done_rx => Some(outcome),
            _ = stop.wait_for_shutdown() => None,
        };

        self.advance();
        let outcome = match finished {
            Some(outcome) => outcome,
            None => {
                tailer_shutdown.shutdown();
                done_rx.await
            }
        }
        .unwrap_or_else(|_| TailOutcome::Fatal("Tailer exited without reporting".to_string()));

        if let Err(e) = tailer_task.await {
            log::error!("Tailer task failed: {e:?}");
        }

        self.advance();
        self.sink_shutdown.shutdown();

        let reporter = self.reporter.clone();
        tokio::task::spawn_blocking(move || reporter.finalize())
            .await
            .context("Failed to finalize the reporter")?;

        self.advance();

        Ok(outcome)
    }
}

/// Relay `log_file` to the reporters selected in `report` until the log goes idle or `stop`
/// fires.
pub async fn run_pipeline(
    log_file: &Path,
    tail: TailConfig,
    report: ReportConfig,
    stop: DelegatedShutdownListener,
) -> anyhow::Result<TailOutcome> {
    let file = File::open(log_file)
        .await
        .with_context(|| format!("Failed to open {}", log_file.display()))?;

    let sink_shutdown = ShutdownHandle::new();
    let reporter = report.init_reporter(&Handle::current(), sink_shutdown.new_listener())?;

    Pipeline::new(reporter, sink_shutdown, tail)
        .run(BufReader::new(file), stop)
        .await
}
