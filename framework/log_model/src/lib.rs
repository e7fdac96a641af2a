//! Model of the records Gatling writes to `simulation.log`, and the parsers that turn log lines
//! into [MetricEvent]s.

mod error;
mod event;
mod parser;
mod timestamp;
mod version;

pub use error::{LineError, ParseError};
pub use event::{
    ErrorEvent, GroupEvent, MetricEvent, RecordKind, RequestEvent, RunEvent, Status, UserEvent,
    UserPhase,
};
pub use parser::LogParser;
pub use timestamp::{parse_jittered, EventTime, NANOS_PER_MILLI};
pub use version::LogFormatVersion;
