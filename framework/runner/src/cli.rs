use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Which destination parsed records are reported to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReporterOpt {
    /// Send points straight to InfluxDB.
    InfluxClient,
    /// Write line protocol files for Telegraf to pick up.
    InfluxFile,
    /// Only print a summary at the end of the run.
    InMemory,
}

#[derive(Parser, Debug)]
#[command(about, version, long_about = None)]
pub struct RelayCli {
    /// The directory Gatling writes its results into.
    ///
    /// It doesn't need to exist yet. The relay waits for it, then for a results directory newer
    /// than the moment the relay was started, then for its simulation.log.
    #[arg(value_name = "TARGET_DIR")]
    pub target_dir: PathBuf,

    /// Label for the system under test, attached to every point.
    #[arg(long, short = 's', default_value = "")]
    pub system_under_test: String,

    /// Label for the environment the test runs against, attached to every point.
    #[arg(long, short = 'e', default_value = "")]
    pub test_environment: String,

    /// Stop once no new line has been written to the log for this many seconds.
    ///
    /// Gatling keeps the log open until the end of the run, so a quiet log is the only sign that
    /// the test has finished. Set this above the longest pause your simulation can have between
    /// two log lines.
    #[arg(long, short = 't', default_value = "30")]
    pub stop_timeout: u64,

    /// Name of this load generator, defaults to the host name.
    #[arg(long)]
    pub node_name: Option<String>,

    /// The reporter to use.
    #[arg(long, value_enum, default_value_t = ReporterOpt::InfluxClient)]
    pub reporter: ReporterOpt,

    /// Also print a summary of the parsed records when the run finishes.
    #[arg(long, default_value = "false")]
    pub summary: bool,

    /// URL of the InfluxDB instance.
    #[arg(long, env = "INFLUX_HOST", default_value = "http://localhost:8086")]
    pub influx_url: String,

    /// InfluxDB bucket, or database for InfluxDB 1.x.
    #[arg(long, env = "INFLUX_BUCKET", default_value = "gatling")]
    pub influx_bucket: String,

    /// InfluxDB 2.x API token.
    #[arg(long, env = "INFLUX_TOKEN", hide_env_values = true)]
    pub influx_token: Option<String>,

    /// InfluxDB 1.x username.
    #[arg(long, env = "INFLUX_USERNAME", requires = "influx_password")]
    pub influx_username: Option<String>,

    /// InfluxDB 1.x password.
    #[arg(long, env = "INFLUX_PASSWORD", hide_env_values = true)]
    pub influx_password: Option<String>,

    /// Directory for line protocol files when using the `influx-file` reporter.
    #[arg(long, default_value = "metrics")]
    pub metrics_dir: PathBuf,
}
