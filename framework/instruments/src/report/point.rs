use gatling_influx_core::prelude::RunIdentity;
use gatling_influx_log_model::MetricEvent;
use influxdb::{InfluxDbWriteable, Timestamp, WriteQuery};

const TESTS_MEASUREMENT: &str = "tests";
const USERS_MEASUREMENT: &str = "users";
const REQUESTS_MEASUREMENT: &str = "requests";
const GROUPS_MEASUREMENT: &str = "groups";
const ERRORS_MEASUREMENT: &str = "errors";

/// Separator used when a group hierarchy is flattened into a single tag value.
const GROUP_PATH_SEPARATOR: &str = " / ";

/// Build the InfluxDB point for an event.
///
/// Every point is tagged with the run identity, and with the simulation name once the RUN header
/// has been seen. Empty tag values are left out because InfluxDB rejects them.
pub(crate) fn event_query(
    identity: &RunIdentity,
    simulation: Option<&str>,
    event: &MetricEvent,
) -> WriteQuery {
    let timestamp = Timestamp::Nanoseconds(event.timestamp().as_nanos());

    let query = match event {
        MetricEvent::Run(run) => {
            let query = timestamp
                .into_query(TESTS_MEASUREMENT)
                .add_tag("action", "start".to_string())
                .add_field("version", run.tool_version.clone())
                .add_field("logFormat", run.format.to_string());
            with_tag(query, "description", &run.description)
        }
        MetricEvent::User(user) => {
            let query = timestamp
                .into_query(USERS_MEASUREMENT)
                .add_tag("action", user.phase.to_string())
                .add_field("count", 1i64);
            let query = with_tag(query, "scenario", &user.scenario);
            with_user_id(query, user.user_id)
        }
        MetricEvent::Request(request) => {
            let query = timestamp
                .into_query(REQUESTS_MEASUREMENT)
                .add_tag("name", request.name.clone())
                .add_tag("result", request.status.to_string())
                .add_field("duration", to_i64(request.response_time_ms()));
            let query = with_tag(query, "groups", &request.groups.join(GROUP_PATH_SEPARATOR));
            let query = with_tag(query, "scenario", request.scenario.as_deref().unwrap_or_default());
            let query = with_user_id(query, request.user_id);
            match &request.message {
                Some(message) => query.add_field("errorMessage", message.clone()),
                None => query,
            }
        }
        MetricEvent::Group(group) => {
            let query = timestamp
                .into_query(GROUPS_MEASUREMENT)
                .add_tag("result", group.status.to_string())
                .add_field("duration", to_i64(group.duration_ms()))
                .add_field(
                    "cumulatedResponseTime",
                    to_i64(group.cumulated_response_time_ms),
                );
            let query = with_tag(query, "groups", &group.groups.join(GROUP_PATH_SEPARATOR));
            with_user_id(query, group.user_id)
        }
        MetricEvent::Error(error) => timestamp
            .into_query(ERRORS_MEASUREMENT)
            .add_field("message", error.message.clone()),
    };

    let simulation = match event {
        MetricEvent::Run(run) => Some(run.simulation_name.as_str()),
        _ => simulation,
    };

    let query = with_tag(query, "nodeName", identity.node_name());
    let query = with_tag(query, "systemUnderTest", identity.system_under_test());
    let query = with_tag(query, "testEnvironment", identity.test_environment());
    with_tag(query, "simulation", simulation.unwrap_or_default())
}

fn with_tag(query: WriteQuery, name: &str, value: &str) -> WriteQuery {
    if value.is_empty() {
        query
    } else {
        query.add_tag(name, value.to_string())
    }
}

fn with_user_id(query: WriteQuery, user_id: Option<u64>) -> WriteQuery {
    match user_id {
        Some(user_id) => query.add_field("userId", to_i64(user_id)),
        None => query,
    }
}

// InfluxDB 1.x has no unsigned integer fields
fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatling_influx_log_model::{
        ErrorEvent, EventTime, LogFormatVersion, RequestEvent, RunEvent, Status, UserEvent,
        UserPhase, NANOS_PER_MILLI,
    };
    use influxdb::Query;
    use std::time::SystemTime;

    fn identity() -> RunIdentity {
        RunIdentity::new("loadgen-1", SystemTime::now())
            .with_system_under_test("shop")
            .with_test_environment("staging")
    }

    fn line(query: WriteQuery) -> String {
        query.build().unwrap().get()
    }

    fn at(millis: u128) -> EventTime {
        EventTime::from_nanos(millis * NANOS_PER_MILLI + 123)
    }

    #[test]
    fn request_point() {
        let event = MetricEvent::Request(RequestEvent {
            scenario: Some("Browse".to_string()),
            user_id: Some(12),
            groups: vec![],
            name: "login".to_string(),
            start: at(1_700_000_000_000),
            end: at(1_700_000_000_250),
            status: Status::Ko,
            message: Some("boom".to_string()),
        });

        let line = line(event_query(&identity(), Some("BasicSimulation"), &event));

        assert!(line.starts_with("requests,"), "{line}");
        assert!(line.contains("name=login"), "{line}");
        assert!(line.contains("result=ko"), "{line}");
        assert!(line.contains("scenario=Browse"), "{line}");
        assert!(line.contains("nodeName=loadgen-1"), "{line}");
        assert!(line.contains("systemUnderTest=shop"), "{line}");
        assert!(line.contains("testEnvironment=staging"), "{line}");
        assert!(line.contains("simulation=BasicSimulation"), "{line}");
        assert!(line.contains("duration=250i"), "{line}");
        assert!(line.contains("userId=12i"), "{line}");
        assert!(line.contains("errorMessage=\"boom\""), "{line}");
        assert!(!line.contains("groups="), "{line}");
        assert!(
            line.ends_with(&(1_700_000_000_000 * NANOS_PER_MILLI + 123).to_string()),
            "{line}"
        );
    }

    #[test]
    fn user_point() {
        let event = MetricEvent::User(UserEvent {
            scenario: "Browse".to_string(),
            user_id: None,
            phase: UserPhase::End,
            timestamp: at(1_700_000_000_000),
        });

        let line = line(event_query(&identity(), None, &event));

        assert!(line.starts_with("users,"), "{line}");
        assert!(line.contains("action=end"), "{line}");
        assert!(line.contains("count=1i"), "{line}");
        assert!(!line.contains("userId"), "{line}");
        assert!(!line.contains("simulation="), "{line}");
    }

    #[test]
    fn run_point_tags_its_own_simulation() {
        let event = MetricEvent::Run(RunEvent {
            simulation_name: "BasicSimulation".to_string(),
            simulation_id: "basicsimulation".to_string(),
            description: String::new(),
            started_at: at(1_700_000_000_000),
            tool_version: "3.9.5".to_string(),
            format: LogFormatVersion::Current,
        });

        let line = line(event_query(&identity(), None, &event));

        assert!(line.starts_with("tests,"), "{line}");
        assert!(line.contains("simulation=BasicSimulation"), "{line}");
        assert!(line.contains("version=\"3.9.5\""), "{line}");
        assert!(line.contains("logFormat=\"current\""), "{line}");
        assert!(!line.contains("description="), "{line}");
    }

    #[test]
    fn empty_identity_labels_are_not_tagged() {
        let event = MetricEvent::Error(ErrorEvent {
            message: "failed".to_string(),
            timestamp: at(1_700_000_000_000),
        });

        let line = line(event_query(
            &RunIdentity::new("node", SystemTime::now()),
            None,
            &event,
        ));

        assert!(line.starts_with("errors,nodeName=node "), "{line}");
        assert!(!line.contains("systemUnderTest"), "{line}");
        assert!(line.contains("message=\"failed\""), "{line}");
    }
}
