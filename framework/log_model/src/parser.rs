use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{LineError, ParseError};
use crate::event::{
    ErrorEvent, GroupEvent, MetricEvent, RecordKind, RequestEvent, RunEvent, Status, UserEvent,
    UserPhase,
};
use crate::timestamp::{parse_jittered, EventTime};
use crate::version::LogFormatVersion;

const FIELD_SEPARATOR: char = '\t';
const GROUP_SEPARATOR: char = ',';

/// Longest slice of an unknown tag that is echoed back in errors.
const MAX_REPORTED_TAG_LEN: usize = 32;

/// Turns `simulation.log` lines into [MetricEvent]s.
///
/// The parser is stateful: the RUN header decides the [LogFormatVersion] used for every later
/// line, and under the legacy layout the scenario of each running user is remembered so that it
/// can be attached to that user's requests. Lines must be fed in the order they appear in the log.
pub struct LogParser<R = StdRng> {
    format: Option<LogFormatVersion>,
    user_scenarios: HashMap<u64, String>,
    rng: R,
}

impl Default for LogParser<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl<R: Rng> LogParser<R> {
    /// Use the given random source for timestamp jitter.
    pub fn with_rng(rng: R) -> Self {
        Self {
            format: None,
            user_scenarios: HashMap::new(),
            rng,
        }
    }

    /// The format version, once the RUN header has been parsed.
    pub fn format(&self) -> Option<LogFormatVersion> {
        self.format
    }

    /// Parse one complete line. A trailing line terminator is ignored.
    ///
    /// A RUN header that can't be parsed is reported as [LineError::Fatal], any other failure as
    /// [LineError::Skipped].
    pub fn parse_line(&mut self, line: &str) -> Result<MetricEvent, LineError> {
        let line = line.trim_end_matches(['\n', '\r']);
        let mut values = line.split(FIELD_SEPARATOR);
        let tag = values.next().unwrap_or_default();

        let Some(kind) = RecordKind::from_tag(tag) else {
            let tag = tag.chars().take(MAX_REPORTED_TAG_LEN).collect();
            return Err(LineError::Skipped(ParseError::UnknownRecord(tag)));
        };

        let fields = Fields {
            kind,
            values: values.collect(),
        };

        match kind {
            RecordKind::Run => self
                .parse_run(&fields)
                .map(MetricEvent::Run)
                .map_err(LineError::Fatal),
            RecordKind::User => Ok(MetricEvent::User(self.parse_user(&fields)?)),
            RecordKind::Request => Ok(MetricEvent::Request(self.parse_request(&fields)?)),
            RecordKind::Group => Ok(MetricEvent::Group(self.parse_group(&fields)?)),
            RecordKind::Error => Ok(MetricEvent::Error(self.parse_error(&fields)?)),
        }
    }

    fn require_format(&self, kind: RecordKind) -> Result<LogFormatVersion, ParseError> {
        self.format.ok_or(ParseError::FormatUnknown(kind))
    }

    fn timestamp(&mut self, raw: &str) -> Result<EventTime, ParseError> {
        parse_jittered(raw, &mut self.rng)
    }

    // RUN <simulation> <simulationId> then, in an order that changed between Gatling releases,
    // the start time, the description and the version token.
    fn parse_run(&mut self, fields: &Fields) -> Result<RunEvent, ParseError> {
        let simulation_name = fields.required(0, "simulation")?;
        let simulation_id = fields.raw(1, "simulationId")?.trim();
        let rest = fields.values.get(2..).unwrap_or_default();

        let (version_index, start_index) = locate_run_fields(rest)?;
        let tool_version = rest[version_index].trim();
        let format = LogFormatVersion::from_version_token(tool_version)
            .ok_or(ParseError::MissingVersion)?;
        let start = rest[start_index];

        let description = rest
            .iter()
            .enumerate()
            .find(|(i, _)| *i != version_index && *i != start_index)
            .map(|(_, value)| value.trim().to_string())
            .unwrap_or_default();

        let started_at = self.timestamp(start)?;

        if let Some(previous) = self.format.replace(format) {
            log::warn!("Found another RUN header, log format changes from {previous} to {format}");
        }
        self.user_scenarios.clear();

        log::info!("Simulation {simulation_name} written by Gatling {tool_version}, using the {format} log format");

        Ok(RunEvent {
            simulation_name: simulation_name.to_string(),
            simulation_id: simulation_id.to_string(),
            description,
            started_at,
            tool_version: tool_version.to_string(),
            format,
        })
    }

    // legacy:  USER <scenario> <userId> <START|END> <start> <end>
    // current: USER <scenario> <START|END> <timestamp>
    fn parse_user(&mut self, fields: &Fields) -> Result<UserEvent, ParseError> {
        let format = self.require_format(RecordKind::User)?;
        let scenario = fields.required(0, "scenario")?.to_string();

        let (user_id, phase, timestamp) = match format {
            LogFormatVersion::Legacy => {
                let user_id = fields.number(1, "userId")?;
                let phase = parse_phase(fields.raw(2, "phase")?)?;
                // A finished user only knows its end time, a starting one only its start time
                let raw_timestamp = match phase {
                    UserPhase::Start => fields.raw(3, "start")?,
                    UserPhase::End => fields.raw(4, "end")?,
                };
                (Some(user_id), phase, self.timestamp(raw_timestamp)?)
            }
            LogFormatVersion::Current => {
                let phase = parse_phase(fields.raw(1, "phase")?)?;
                (None, phase, self.timestamp(fields.raw(2, "timestamp")?)?)
            }
        };

        if let Some(user_id) = user_id {
            match phase {
                UserPhase::Start => {
                    self.user_scenarios.insert(user_id, scenario.clone());
                }
                UserPhase::End => {
                    self.user_scenarios.remove(&user_id);
                }
            }
        }

        Ok(UserEvent {
            scenario,
            user_id,
            phase,
            timestamp,
        })
    }

    // legacy:  REQUEST <userId> <groups> <name> <start> <end> <OK|KO> [message]
    // current: REQUEST <groups> <name> <start> <end> <OK|KO> [message]
    fn parse_request(&mut self, fields: &Fields) -> Result<RequestEvent, ParseError> {
        let format = self.require_format(RecordKind::Request)?;
        let (user_id, offset) = match format {
            LogFormatVersion::Legacy => (Some(fields.number(0, "userId")?), 1),
            LogFormatVersion::Current => (None, 0),
        };

        let groups = parse_groups(fields.raw(offset, "groups")?);
        let name = fields.required(offset + 1, "name")?.to_string();
        let start = self.timestamp(fields.raw(offset + 2, "start")?)?;
        let end = self.timestamp(fields.raw(offset + 3, "end")?)?;
        let status = fields.status(offset + 4)?;
        let message = fields.optional(offset + 5).map(str::to_string);

        let scenario = user_id.and_then(|id| self.user_scenarios.get(&id).cloned());

        Ok(RequestEvent {
            scenario,
            user_id,
            groups,
            name,
            start,
            end,
            status,
            message,
        })
    }

    // legacy:  GROUP <userId> <groups> <start> <end> <cumulatedResponseTime> <OK|KO>
    // current: GROUP <groups> <start> <end> <cumulatedResponseTime> <OK|KO>
    fn parse_group(&mut self, fields: &Fields) -> Result<GroupEvent, ParseError> {
        let format = self.require_format(RecordKind::Group)?;
        let (user_id, offset) = match format {
            LogFormatVersion::Legacy => (Some(fields.number(0, "userId")?), 1),
            LogFormatVersion::Current => (None, 0),
        };

        let groups = parse_groups(fields.required(offset, "groups")?);
        let start = self.timestamp(fields.raw(offset + 1, "start")?)?;
        let end = self.timestamp(fields.raw(offset + 2, "end")?)?;
        let cumulated_response_time_ms = fields.number(offset + 3, "cumulatedResponseTime")?;
        let status = fields.status(offset + 4)?;

        Ok(GroupEvent {
            user_id,
            groups,
            start,
            end,
            cumulated_response_time_ms,
            status,
        })
    }

    // ERROR <message> <timestamp>, the same in every format
    fn parse_error(&mut self, fields: &Fields) -> Result<ErrorEvent, ParseError> {
        let message = fields.required(0, "message")?.to_string();
        let timestamp = self.timestamp(fields.raw(1, "timestamp")?)?;

        Ok(ErrorEvent { message, timestamp })
    }
}

/// The tab separated values that follow the record tag.
struct Fields<'a> {
    kind: RecordKind,
    values: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    fn raw(&self, index: usize, field: &'static str) -> Result<&'a str, ParseError> {
        self.values
            .get(index)
            .copied()
            .ok_or(ParseError::MissingField {
                kind: self.kind,
                field,
            })
    }

    /// Like [Fields::raw] but blank values count as missing.
    fn required(&self, index: usize, field: &'static str) -> Result<&'a str, ParseError> {
        let value = self.raw(index, field)?.trim();
        if value.is_empty() {
            return Err(ParseError::MissingField {
                kind: self.kind,
                field,
            });
        }
        Ok(value)
    }

    fn optional(&self, index: usize) -> Option<&'a str> {
        self.values
            .get(index)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn number(&self, index: usize, field: &'static str) -> Result<u64, ParseError> {
        let value = self.raw(index, field)?;
        value
            .trim()
            .parse()
            .map_err(|source| ParseError::InvalidNumber {
                kind: self.kind,
                field,
                value: value.to_string(),
                source,
            })
    }

    fn status(&self, index: usize) -> Result<Status, ParseError> {
        let value = self.raw(index, "status")?;
        Status::from_field(value).ok_or_else(|| ParseError::InvalidStatus {
            kind: self.kind,
            value: value.to_string(),
        })
    }
}

fn parse_phase(value: &str) -> Result<UserPhase, ParseError> {
    UserPhase::from_field(value).ok_or_else(|| ParseError::InvalidPhase(value.to_string()))
}

fn parse_groups(value: &str) -> Vec<String> {
    value
        .split(GROUP_SEPARATOR)
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(str::to_string)
        .collect()
}

/// Indices of the version token and start time among the RUN fields after the simulation id.
///
/// Gatling releases write `<start> <description> <version>`, so that layout is checked first and
/// a version-like description can't shadow the real version. Otherwise the first version-like
/// field is the version, as in `<version> <start> <description>`.
fn locate_run_fields(rest: &[&str]) -> Result<(usize, usize), ParseError> {
    if let [start, _, version, ..] = rest {
        if is_decimal(start) && LogFormatVersion::from_version_token(version).is_some() {
            return Ok((2, 0));
        }
    }

    let version_index = rest
        .iter()
        .position(|value| LogFormatVersion::from_version_token(value).is_some())
        .ok_or(ParseError::MissingVersion)?;
    let start_index = rest
        .iter()
        .enumerate()
        .position(|(i, value)| i != version_index && is_decimal(value))
        .ok_or(ParseError::MissingField {
            kind: RecordKind::Run,
            field: "start",
        })?;

    Ok((version_index, start_index))
}

fn is_decimal(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
