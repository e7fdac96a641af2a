mod requests_table;

use crate::report::in_memory_reporter::requests_table::{RecordRow, RequestRow};
use crate::report::ReportCollector;
use gatling_influx_log_model::{MetricEvent, RecordKind, RequestEvent, Status};
use std::collections::{BTreeMap, HashMap};
use tabled::settings::Style;
use tabled::Table;

const RECORD_KINDS: [RecordKind; 5] = [
    RecordKind::Run,
    RecordKind::User,
    RecordKind::Request,
    RecordKind::Group,
    RecordKind::Error,
];

#[derive(Debug, Default, Clone, PartialEq)]
struct RequestStats {
    ok: usize,
    ko: usize,
    total_time_ms: u64,
    min_time_ms: Option<u64>,
    max_time_ms: u64,
}

impl RequestStats {
    fn record(&mut self, request: &RequestEvent) {
        match request.status {
            Status::Ok => self.ok += 1,
            Status::Ko => self.ko += 1,
        }

        let time = request.response_time_ms();
        self.total_time_ms = self.total_time_ms.saturating_add(time);
        self.min_time_ms = Some(self.min_time_ms.map_or(time, |min| min.min(time)));
        self.max_time_ms = self.max_time_ms.max(time);
    }

    fn count(&self) -> usize {
        self.ok + self.ko
    }
}

/// A very basic reporter that is useful while trying things out locally. It keeps counts of what
/// was parsed in memory and prints a summary at the end of the run.
#[derive(Default)]
pub struct InMemoryReporter {
    records: HashMap<RecordKind, usize>,
    requests: BTreeMap<String, RequestStats>,
}

impl InMemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self, kind: RecordKind) -> usize {
        self.records.get(&kind).copied().unwrap_or_default()
    }

    fn request_rows(&self) -> Vec<RequestRow> {
        self.requests
            .iter()
            .map(|(request, stats)| RequestRow {
                request: request.clone(),
                ok: stats.ok,
                ko: stats.ko,
                avg_time_ms: stats.total_time_ms as f64 / stats.count().max(1) as f64,
                min_time_ms: stats.min_time_ms.unwrap_or_default(),
                max_time_ms: stats.max_time_ms,
            })
            .collect()
    }

    fn print_summary(&self) {
        println!("\nSummary of records");
        let rows = RECORD_KINDS
            .iter()
            .map(|kind| RecordRow {
                record: kind.to_string(),
                count: self.record_count(*kind),
            })
            .collect::<Vec<_>>();
        let mut table = Table::new(rows);
        table.with(Style::modern());
        println!("{table}");

        if self.requests.is_empty() {
            return;
        }

        println!("\nSummary of requests");
        let mut table = Table::new(self.request_rows());
        table.with(Style::modern());
        println!("{table}");
    }
}

impl ReportCollector for InMemoryReporter {
    fn add_event(&mut self, event: &MetricEvent) {
        *self.records.entry(event.kind()).or_default() += 1;

        if let MetricEvent::Request(request) = event {
            self.requests
                .entry(request.name.clone())
                .or_default()
                .record(request);
        }
    }

    fn finalize(&self) {
        self.print_summary();
    }
}
