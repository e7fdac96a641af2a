use crate::timestamp::EventTime;
use crate::version::LogFormatVersion;

/// The kinds of record found in `simulation.log`, named after the tag that starts each line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum RecordKind {
    #[display("RUN")]
    Run,
    #[display("USER")]
    User,
    #[display("REQUEST")]
    Request,
    #[display("GROUP")]
    Group,
    #[display("ERROR")]
    Error,
}

impl RecordKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "RUN" => Some(RecordKind::Run),
            "USER" => Some(RecordKind::User),
            "REQUEST" => Some(RecordKind::Request),
            "GROUP" => Some(RecordKind::Group),
            "ERROR" => Some(RecordKind::Error),
            _ => None,
        }
    }
}

/// Outcome of a request or group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Status {
    #[display("ok")]
    Ok,
    #[display("ko")]
    Ko,
}

impl Status {
    pub(crate) fn from_field(value: &str) -> Option<Self> {
        match value.trim() {
            "OK" => Some(Status::Ok),
            "KO" => Some(Status::Ko),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum UserPhase {
    #[display("start")]
    Start,
    #[display("end")]
    End,
}

impl UserPhase {
    pub(crate) fn from_field(value: &str) -> Option<Self> {
        match value.trim() {
            "START" => Some(UserPhase::Start),
            "END" => Some(UserPhase::End),
            _ => None,
        }
    }
}

/// The RUN header that opens every simulation log.
#[derive(Debug, Clone, PartialEq)]
pub struct RunEvent {
    pub simulation_name: String,
    pub simulation_id: String,
    pub description: String,
    pub started_at: EventTime,
    /// The version token exactly as written in the header.
    pub tool_version: String,
    pub format: LogFormatVersion,
}

/// A virtual user starting or finishing its scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct UserEvent {
    pub scenario: String,
    /// Only written by the legacy layout.
    pub user_id: Option<u64>,
    pub phase: UserPhase,
    pub timestamp: EventTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    /// Known when the legacy layout lets the request be tied back to its user.
    pub scenario: Option<String>,
    pub user_id: Option<u64>,
    /// Enclosing groups, outermost first.
    pub groups: Vec<String>,
    pub name: String,
    pub start: EventTime,
    pub end: EventTime,
    pub status: Status,
    pub message: Option<String>,
}

impl RequestEvent {
    pub fn response_time_ms(&self) -> u64 {
        self.end.millis_since(self.start)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupEvent {
    pub user_id: Option<u64>,
    pub groups: Vec<String>,
    pub start: EventTime,
    pub end: EventTime,
    /// Sum of the response times of the requests inside the group.
    pub cumulated_response_time_ms: u64,
    pub status: Status,
}

impl GroupEvent {
    pub fn duration_ms(&self) -> u64 {
        self.end.millis_since(self.start)
    }
}

/// An error Gatling reported outside of a request, for example a failed check in a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub message: String,
    pub timestamp: EventTime,
}

/// A structured record parsed from one log line.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    Run(RunEvent),
    User(UserEvent),
    Request(RequestEvent),
    Group(GroupEvent),
    Error(ErrorEvent),
}

impl MetricEvent {
    pub fn kind(&self) -> RecordKind {
        match self {
            MetricEvent::Run(_) => RecordKind::Run,
            MetricEvent::User(_) => RecordKind::User,
            MetricEvent::Request(_) => RecordKind::Request,
            MetricEvent::Group(_) => RecordKind::Group,
            MetricEvent::Error(_) => RecordKind::Error,
        }
    }

    /// The time the point for this event is stored under.
    pub fn timestamp(&self) -> EventTime {
        match self {
            MetricEvent::Run(run) => run.started_at,
            MetricEvent::User(user) => user.timestamp,
            MetricEvent::Request(request) => request.start,
            MetricEvent::Group(group) => group.start,
            MetricEvent::Error(error) => error.timestamp,
        }
    }
}
