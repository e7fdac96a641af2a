//! Reporters that take parsed Gatling records and ship them to InfluxDB.

mod report;

pub use report::{
    InMemoryReporter, InfluxClientConfig, InfluxClientReportCollector, InfluxFileReportCollector,
    ReportCollector, ReportConfig, Reporter,
};
