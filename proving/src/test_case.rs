use std::{cell::Cell, fmt, rc::Rc};

use crate::{
    Channel, Comparator, Config, DEFAULT_TEST_NAME, Emitter, Error, Event, Events, Result,
    Target, Value, error::capture,
};

/// The function run by a test. It receives the test itself, so assertions
/// read as `test.ok(..)`, and must eventually call [`TestCase::done`].
pub type TestBody = Rc<dyn Fn(&TestCase) -> Result>;

/// Lifecycle of a single test run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Complete,
}

/// Expected assertion count passed to [`TestCase::done`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Plan {
    /// Finish without checking the number of assertions.
    #[default]
    Unchecked,
    /// Rounded up and compared with the assertions recorded so far.
    /// Negative or NaN counts are not checked.
    Count(f64),
}

impl From<()> for Plan {
    fn from(_: ()) -> Self {
        Plan::Unchecked
    }
}

impl From<f64> for Plan {
    fn from(count: f64) -> Self {
        Plan::Count(count)
    }
}

impl From<i32> for Plan {
    fn from(count: i32) -> Self {
        Plan::Count(f64::from(count))
    }
}

impl From<u32> for Plan {
    fn from(count: u32) -> Self {
        Plan::Count(f64::from(count))
    }
}

impl From<usize> for Plan {
    fn from(count: usize) -> Self {
        Plan::Count(count as f64)
    }
}

impl<T: Into<Plan>> From<Option<T>> for Plan {
    fn from(count: Option<T>) -> Self {
        count.map_or(Plan::Unchecked, Into::into)
    }
}

struct TestState {
    name: String,
    body: Option<TestBody>,
    assertions: Cell<usize>,
    failures: Cell<usize>,
    errors: Cell<usize>,
    phase: Cell<Phase>,
    generation: Cell<u64>,
    events: Events,
    comparator: Comparator,
}

/// A single unit test: a body plus assertion bookkeeping.
///
/// While running, every `assertion`, `failure` and `error` event emitted on
/// the test is counted. A body that returns `Err` or panics is reported as an
/// `error` event and the test is completed on its behalf, so a broken test can
/// never stall a [`Suite`](crate::Suite).
///
/// `TestCase` is a cheap handle; clones refer to the same test.
///
/// # Example
///
/// ```rust
/// use proving::{Emitter, Event, TestCase};
///
/// let test = TestCase::new("arithmetic", |t| {
///     t.equal(2 + 2, 4, ()).ok(true, "truth");
///     t.done(2);
///     Ok(())
/// });
/// test.on("failure", |e: &Event| eprintln!("unexpected failure: {:?}", e.message()));
/// test.run();
/// assert_eq!(test.assertions(), 2);
/// ```
#[derive(Clone)]
pub struct TestCase(Rc<TestState>);

impl TestCase {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&TestCase) -> Result + 'static,
    {
        Self::with_config(Some(name.into()), Some(Rc::new(body)), &Config::default())
    }

    /// A test named [`DEFAULT_TEST_NAME`].
    pub fn unnamed<F>(body: F) -> Self
    where
        F: Fn(&TestCase) -> Result + 'static,
    {
        Self::with_config(None, Some(Rc::new(body)), &Config::default())
    }

    /// A test with nothing to run. Running it reports [`Error::MissingBody`].
    pub fn without_body(name: impl Into<String>) -> Self {
        Self::with_config(Some(name.into()), None, &Config::default())
    }

    pub fn with_config(name: Option<String>, body: Option<TestBody>, config: &Config) -> Self {
        Self(Rc::new(TestState {
            name: name.unwrap_or_else(|| DEFAULT_TEST_NAME.to_string()),
            body,
            assertions: Cell::new(0),
            failures: Cell::new(0),
            errors: Cell::new(0),
            phase: Cell::new(Phase::Idle),
            generation: Cell::new(0),
            events: Events::new(),
            comparator: Comparator::from(config),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn assertions(&self) -> usize {
        self.0.assertions.get()
    }

    pub fn failures(&self) -> usize {
        self.0.failures.get()
    }

    pub fn errors(&self) -> usize {
        self.0.errors.get()
    }

    pub fn phase(&self) -> Phase {
        self.0.phase.get()
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    pub fn ptr_eq(&self, other: &TestCase) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Incremented by every run; lets deferred work tell runs apart.
    pub(crate) fn generation(&self) -> u64 {
        self.0.generation.get()
    }

    pub(crate) fn comparator(&self) -> &Comparator {
        &self.0.comparator
    }

    /// Run the test. A no-op while a run is in progress.
    ///
    /// Resets the counters, emits `setup` and invokes the body. The run ends
    /// when the body (possibly later, from another task) calls
    /// [`TestCase::done`], or right away if the body fails.
    pub fn run(&self) -> &Self {
        if self.is_running() {
            tracing::trace!(test = %self.name(), "test already running");
            return self;
        }
        self.0.assertions.set(0);
        self.0.failures.set(0);
        self.0.errors.set(0);
        self.0.generation.set(self.0.generation.get() + 1);
        self.0.phase.set(Phase::Running);
        tracing::debug!(test = %self.name(), "test started");
        self.emit(Channel::SETUP);

        let outcome = match &self.0.body {
            Some(body) => {
                let body = body.clone();
                capture(|| body(self))
            }
            None => Err(Error::MissingBody),
        };
        if let Err(error) = outcome {
            self.abort(error);
        }
        self
    }

    /// Report `error` and complete the current run.
    ///
    /// Used when a body fails; asynchronous bodies can call it directly.
    /// Outside a run the error is only logged.
    pub fn abort(&self, error: Error) -> &Self {
        if !self.is_running() {
            tracing::warn!(test = %self.name(), error = %error, "error after test completed");
            return self;
        }
        tracing::debug!(test = %self.name(), error = %error, "test aborted");
        self.emit(Event::new(Channel::ERROR).with_error(error));
        self.done(Plan::Unchecked)
    }

    /// Record a passing assertion.
    pub fn assert(
        &self,
        actual: impl Into<Value>,
        expected: impl Into<Value>,
        message: impl Into<Message>,
    ) -> &Self {
        self.record(Channel::ASSERTION, actual.into(), expected.into(), message.into())
    }

    /// Record a failing assertion.
    pub fn fail(
        &self,
        actual: impl Into<Value>,
        expected: impl Into<Value>,
        message: impl Into<Message>,
    ) -> &Self {
        self.record(Channel::FAILURE, actual.into(), expected.into(), message.into())
    }

    fn record(&self, channel: Channel, actual: Value, expected: Value, message: Message) -> &Self {
        if !self.is_running() {
            tracing::debug!(
                test = %self.name(),
                channel = %channel,
                "ignoring assertion outside a run"
            );
            return self;
        }
        let mut event = Event::new(channel).with_actual(actual).with_expected(expected);
        if let Some(message) = message.0 {
            event = event.with_message(message);
        }
        self.emit_event(event);
        self
    }

    /// Finish the current run and emit `teardown`. A no-op outside a run.
    ///
    /// With a [`Plan::Count`], a mismatch against the number of passed
    /// assertions is recorded as one more failure with message `"done"`.
    pub fn done(&self, plan: impl Into<Plan>) -> &Self {
        if !self.is_running() {
            tracing::trace!(test = %self.name(), "done called outside a run");
            return self;
        }
        if let Plan::Count(expected) = plan.into() {
            if expected >= 0.0 {
                let expected = expected.ceil();
                let actual = self.assertions();
                if actual as f64 != expected {
                    self.fail(actual, expected, "done");
                }
            }
        }
        self.0.phase.set(Phase::Complete);
        tracing::debug!(
            test = %self.name(),
            assertions = self.assertions(),
            failures = self.failures(),
            errors = self.errors(),
            "test finished"
        );
        self.emit(Channel::TEARDOWN);
        self
    }

    fn tally(&self, channel: &Channel) -> bool {
        let counter = if *channel == Channel::ASSERTION {
            &self.0.assertions
        } else if *channel == Channel::FAILURE {
            &self.0.failures
        } else if *channel == Channel::ERROR {
            &self.0.errors
        } else {
            return false;
        };
        counter.set(counter.get() + 1);
        true
    }
}

impl Emitter for TestCase {
    fn events(&self) -> &Events {
        &self.0.events
    }

    fn as_target(&self) -> Target {
        Target::Test(self.clone())
    }

    fn emit_event(&self, mut event: Event) {
        event.tallied = self.is_running() && self.tally(event.channel());
        self.0.events.dispatch(event, self);
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name())
            .field("phase", &self.phase())
            .field("assertions", &self.assertions())
            .field("failures", &self.failures())
            .field("errors", &self.errors())
            .finish()
    }
}

impl From<TestCase> for Target {
    fn from(test: TestCase) -> Self {
        Target::Test(test)
    }
}

/// Optional assertion message; `()` means "use the assertion's name".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message(pub(crate) Option<String>);

impl Message {
    pub(crate) fn or(self, default: &str) -> Message {
        Message(Some(self.0.unwrap_or_else(|| default.to_string())))
    }
}

impl From<()> for Message {
    fn from(_: ()) -> Self {
        Message(None)
    }
}

impl From<&str> for Message {
    fn from(message: &str) -> Self {
        Message(Some(message.to_string()))
    }
}

impl From<String> for Message {
    fn from(message: String) -> Self {
        Message(Some(message))
    }
}

impl From<Option<&str>> for Message {
    fn from(message: Option<&str>) -> Self {
        Message(message.map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn channels(test: &TestCase) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        test.on("all", move |e: &Event| l.borrow_mut().push(e.channel().to_string()));
        log
    }

    #[test]
    fn run_emits_setup_assertions_and_teardown() {
        let test = TestCase::new("basic", |t| {
            t.assert(1, 1, "first");
            t.fail(1, 2, "second");
            t.done(());
            Ok(())
        });
        let log = channels(&test);
        test.run();

        assert_eq!(*log.borrow(), ["setup", "assertion", "failure", "teardown"]);
        assert_eq!(test.assertions(), 1);
        assert_eq!(test.failures(), 1);
        assert_eq!(test.errors(), 0);
        assert_eq!(test.phase(), Phase::Complete);
    }

    #[test]
    fn done_reports_a_count_mismatch() {
        let test = TestCase::new("count", |t| {
            t.assert(true, true, ());
            t.done(2);
            Ok(())
        });
        let failures = Rc::new(RefCell::new(Vec::new()));
        let f = failures.clone();
        test.on("failure", move |e: &Event| f.borrow_mut().push(e.clone()));
        test.run();

        let failures = failures.borrow();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].message(), Some("done"));
        assert_eq!(failures[0].actual(), Some(&Value::from(1)));
        assert_eq!(failures[0].expected(), Some(&Value::from(2)));
        assert_eq!(test.failures(), 1);
    }

    #[test]
    fn done_rounds_the_plan_up() {
        let test = TestCase::new("ceil", |t| {
            t.assert(1, 1, ()).assert(2, 2, ());
            t.done(1.2);
            Ok(())
        });
        test.run();
        assert_eq!(test.failures(), 0);
    }

    #[test]
    fn negative_and_missing_plans_are_unchecked() {
        for plan in [Plan::Count(-1.0), Plan::Count(f64::NAN), Plan::Unchecked] {
            let test = TestCase::unnamed(move |t| {
                t.assert(1, 1, ());
                t.done(plan);
                Ok(())
            });
            test.run();
            assert_eq!(test.failures(), 0, "plan {plan:?}");
        }
        assert_eq!(Plan::from(None::<u32>), Plan::Unchecked);
        assert_eq!(Plan::from(Some(3u32)), Plan::Count(3.0));
    }

    #[test]
    fn second_done_is_a_noop() {
        let test = TestCase::new("twice", |t| {
            t.done(()).done(()).done(5);
            Ok(())
        });
        let log = channels(&test);
        test.run();
        assert_eq!(*log.borrow(), ["setup", "teardown"]);
        assert_eq!(test.failures(), 0);
    }

    #[test]
    fn body_error_completes_the_test() {
        let test = TestCase::new("throws", |t| {
            t.ok(true, ());
            Err(Error::new("boom"))
        });
        let errors = Rc::new(RefCell::new(Vec::new()));
        let e = errors.clone();
        test.on("error", move |ev: &Event| e.borrow_mut().push(ev.error().cloned()));
        let log = channels(&test);
        test.run();

        assert_eq!(*log.borrow(), ["setup", "assertion", "error", "teardown"]);
        assert_eq!(*errors.borrow(), [Some(Error::new("boom"))]);
        assert_eq!(test.errors(), 1);
        assert_eq!(test.assertions(), 1);
        assert!(!test.is_running());
    }

    #[test]
    fn body_panic_is_an_error() {
        let test = TestCase::new("panics", |_| panic!("bad body"));
        test.run();
        assert_eq!(test.errors(), 1);
        assert_eq!(test.phase(), Phase::Complete);
    }

    #[test]
    fn missing_body_is_an_error() {
        let test = TestCase::without_body("empty");
        let log = channels(&test);
        test.run();
        assert_eq!(*log.borrow(), ["setup", "error", "teardown"]);
        assert_eq!(test.errors(), 1);
    }

    #[test]
    fn error_after_done_is_not_counted() {
        let test = TestCase::new("late", |t| {
            t.done(());
            Err(Error::new("too late"))
        });
        let log = channels(&test);
        test.run();
        assert_eq!(*log.borrow(), ["setup", "teardown"]);
        assert_eq!(test.errors(), 0);
    }

    #[test]
    fn assertions_outside_a_run_are_ignored() {
        let test = TestCase::without_body("idle");
        let log = channels(&test);
        test.ok(true, ()).fail(1, 2, ()).done(1);
        assert!(log.borrow().is_empty());
        assert_eq!(test.assertions(), 0);
        assert_eq!(test.phase(), Phase::Idle);
    }

    #[test]
    fn rerunning_resets_counters() {
        let test = TestCase::new("again", |t| {
            t.ok(true, ()).ok(false, ());
            t.done(());
            Ok(())
        });
        test.run().run();
        assert_eq!(test.assertions(), 1);
        assert_eq!(test.failures(), 1);
        assert_eq!(test.generation(), 2);
    }

    #[test]
    fn run_while_running_is_a_noop() {
        let test = TestCase::new("reentrant", |t| {
            t.run();
            t.ok(true, ());
            t.done(1);
            Ok(())
        });
        let log = channels(&test);
        test.run();
        assert_eq!(*log.borrow(), ["setup", "assertion", "teardown"]);
        assert_eq!(test.generation(), 1);
    }

    #[test]
    fn failing_listener_counts_as_test_error() {
        let test = TestCase::new("listener", |t| {
            t.ok(true, ());
            t.done(());
            Ok(())
        });
        test.on("assertion", |_: &Event| -> Result { Err(Error::new("listener")) });
        test.run();
        assert_eq!(test.errors(), 1);
        assert_eq!(test.assertions(), 1);
    }

    #[test]
    fn events_target_the_test() {
        let test = TestCase::new("target", |t| {
            t.done(());
            Ok(())
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        test.on("setup teardown", move |e: &Event| s.borrow_mut().push(e.test().cloned()));
        test.run();
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|t| t.as_ref().is_some_and(|t| t.ptr_eq(&test))));
    }

    #[test]
    fn default_name() {
        assert_eq!(TestCase::unnamed(|_| Ok(())).name(), DEFAULT_TEST_NAME);
    }
}
