use std::time::SystemTime;

/// Describes the run being relayed.
///
/// Captured once when the process starts and never changed afterwards. The labels are attached to
/// every point sent to the metrics backend, and the start time decides which results directory
/// belongs to this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIdentity {
    started_at: SystemTime,
    node_name: String,
    system_under_test: String,
    test_environment: String,
}

impl RunIdentity {
    pub fn new(node_name: impl Into<String>, started_at: SystemTime) -> Self {
        Self {
            started_at,
            node_name: node_name.into(),
            system_under_test: String::new(),
            test_environment: String::new(),
        }
    }

    pub fn with_system_under_test(mut self, system_under_test: impl Into<String>) -> Self {
        self.system_under_test = system_under_test.into();
        self
    }

    pub fn with_test_environment(mut self, test_environment: impl Into<String>) -> Self {
        self.test_environment = test_environment.into();
        self
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn system_under_test(&self) -> &str {
        &self.system_under_test
    }

    pub fn test_environment(&self) -> &str {
        &self.test_environment
    }
}
