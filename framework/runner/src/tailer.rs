use std::sync::Arc;
use std::time::Duration;

use gatling_influx_core::prelude::DelegatedShutdownListener;
use gatling_influx_instruments::Reporter;
use gatling_influx_log_model::{LineError, LogParser};
use rand::rngs::StdRng;
use rand::Rng;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::select;
use tokio::sync::oneshot;
use tokio::time::Instant;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct TailConfig {
    /// Stop once no complete line has been read for this long.
    pub idle_timeout: Duration,
    /// How long to wait for more data after reaching the end of the log.
    pub poll_interval: Duration,
}

impl TailConfig {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Why the tailer stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailOutcome {
    /// The log stopped growing, which is how a finished run looks.
    IdleTimeout,
    /// The tailer was asked to stop.
    Stopped,
    /// The log can't be interpreted, carries the reason.
    Fatal(String),
}

/// Follows a log that is still being written and forwards each complete line as an event.
pub struct Tailer<B, G = StdRng> {
    reader: B,
    parser: LogParser<G>,
    reporter: Arc<Reporter>,
    config: TailConfig,
    line: Vec<u8>,
    idle_since: Instant,
}

impl<B, G> Tailer<B, G>
where
    B: AsyncBufRead + Unpin,
    G: Rng,
{
    pub fn new(
        reader: B,
        parser: LogParser<G>,
        reporter: Arc<Reporter>,
        config: TailConfig,
    ) -> Self {
        Self {
            reader,
            parser,
            reporter,
            config,
            line: Vec::new(),
            idle_since: Instant::now(),
        }
    }

    /// Tail until idle, stopped or a fatal line, then send the reason on `done`.
    pub async fn run(
        mut self,
        mut shutdown_listener: DelegatedShutdownListener,
        done: oneshot::Sender<TailOutcome>,
    ) {
        log::info!(
            "Tailing started, stopping after {}s without new lines",
            self.config.idle_timeout.as_secs()
        );
        self.idle_since = Instant::now();

        let outcome = self.tail(&mut shutdown_listener).await;

        if !self.line.is_empty() {
            log::warn!(
                "Discarding incomplete last line of {} bytes",
                self.line.len()
            );
        }
        match &outcome {
            TailOutcome::Fatal(reason) => log::error!("Tailing failed: {reason}"),
            outcome => log::info!("Tailing finished: {outcome:?}"),
        }

        if done.send(outcome).is_err() {
            log::debug!("Nobody is waiting for the tailer to finish");
        }
    }

    async fn tail(&mut self, shutdown_listener: &mut DelegatedShutdownListener) -> TailOutcome {
        loop {
            if shutdown_listener.should_shutdown() {
                return TailOutcome::Stopped;
            }

            match self.reader.read_until(b'\n', &mut self.line).await {
                Ok(_) if self.line.ends_with(b"\n") => {
                    let dispatched = self.dispatch_line();
                    self.line.clear();
                    if let Err(reason) = dispatched {
                        return TailOutcome::Fatal(reason);
                    }
                    self.idle_since = Instant::now();
                }
                Ok(_) => {
                    if self.idle_since.elapsed() >= self.config.idle_timeout {
                        return TailOutcome::IdleTimeout;
                    }
                    if !pause(self.config.poll_interval, shutdown_listener).await {
                        return TailOutcome::Stopped;
                    }
                }
                Err(e) => {
                    log::error!("Failed to read from the log: {e}");
                    if !pause(self.config.poll_interval, shutdown_listener).await {
                        return TailOutcome::Stopped;
                    }
                }
            }
        }
    }

    fn dispatch_line(&mut self) -> Result<(), String> {
        let line = String::from_utf8_lossy(&self.line);
        if line.trim().is_empty() {
            return Ok(());
        }

        match self.parser.parse_line(&line) {
            Ok(event) => {
                self.reporter.add_event(&event);
                Ok(())
            }
            Err(LineError::Fatal(e)) => Err(e.to_string()),
            Err(LineError::Skipped(e)) => {
                log::warn!("Skipping line: {e}");
                Ok(())
            }
        }
    }
}

/// Wait for `poll_interval`, returns false if shutdown was requested meanwhile.
async fn pause(
    poll_interval: Duration,
    shutdown_listener: &mut DelegatedShutdownListener,
) -> bool {
    select! {
        _ = tokio::time::sleep(poll_interval) => true,
        _ = shutdown_listener.wait_for_shutdown() => false,
    }
}
