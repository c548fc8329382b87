use std::time::Duration;

/// Name given to a [`TestCase`](crate::TestCase) created without one.
pub const DEFAULT_TEST_NAME: &str = "Anonymous Test";

/// Name given to a [`Suite`](crate::Suite) created without one.
pub const DEFAULT_SUITE_NAME: &str = "Anonymous Suite";

/// How a [`Suite`](crate::Suite) hands each test run to the scheduler.
///
/// See [`Scheduler`](crate::Scheduler) for the guarantees each strategy gives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Scheduling {
    /// Run the next test directly from the previous test's teardown.
    Immediate,

    /// Trampoline: runs are queued and drained after the current one returns.
    #[default]
    Queued,

    /// Spawn each run on the current `tokio::task::LocalSet`.
    Local,
}

/// Runtime configuration for suites, tests and the equality comparator.
///
/// Configuration is an immutable value passed to constructors; there is no
/// global state. Use the builder methods to customize, or [`Default`].
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use proving::{Config, Scheduling};
///
/// let config = Config::default()
///     .with_scheduling(Scheduling::Local)
///     .with_test_timeout(Duration::from_secs(2))
///     .with_compare_last_index(true);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    scheduling: Scheduling,

    /// Whether deep equality also compares a pattern's `last_index` cursor.
    /// Default: false
    compare_last_index: bool,

    /// Abort a test that has not called `done` within this time.
    /// Only honored by schedulers that support delayed tasks.
    /// Default: none
    test_timeout: Option<Duration>,
}

impl Config {
    pub fn with_scheduling(mut self, scheduling: Scheduling) -> Self {
        self.scheduling = scheduling;
        self
    }

    pub fn scheduling(&self) -> Scheduling {
        self.scheduling
    }

    /// Include the stateful cursor of global patterns in deep equality.
    pub fn with_compare_last_index(mut self, enabled: bool) -> Self {
        self.compare_last_index = enabled;
        self
    }

    pub fn compares_last_index(&self) -> bool {
        self.compare_last_index
    }

    /// Set the per-test timeout.
    ///
    /// When it elapses before the test calls `done`, the test is aborted with
    /// [`Error::Timeout`](crate::Error::Timeout) and the suite moves on.
    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = Some(timeout);
        self
    }

    pub fn test_timeout(&self) -> Option<Duration> {
        self.test_timeout
    }
}
