use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
    time::Duration,
};

use rand::{Rng, seq::SliceRandom};

use crate::{
    Channel, Config, DEFAULT_SUITE_NAME, Emitter, Error, Event, Events, Listener, Result,
    Scheduler, Target, TestCase,
    scheduler::{self, Task},
};

/// The relay currently attached to a running test.
struct Attachment {
    position: usize,
    test: TestCase,
    relay: Listener,
}

struct SuiteState {
    name: String,
    slots: RefCell<Vec<Option<TestCase>>>,
    assertions: Cell<usize>,
    failures: Cell<usize>,
    errors: Cell<usize>,
    running: Cell<bool>,
    attachment: RefCell<Option<Attachment>>,
    events: Events,
    config: Config,
    scheduler: Rc<dyn Scheduler>,
}

/// An ordered collection of tests, run one at a time.
///
/// Running a suite emits `start`, then runs each test in slot order, and
/// finally emits `complete`. Every event a test emits is re-emitted on the
/// suite, so a reporter only needs to listen to the suite. The next test is
/// started only after the previous one has emitted `teardown`, however long
/// its body takes to call `done`.
///
/// Slots may be empty ("holes"); they are skipped.
///
/// # Example
///
/// ```rust
/// use proving::{Emitter, Event, Suite};
///
/// let suite = Suite::new("math");
/// suite
///     .add_test("addition", |t| {
///         t.equal(1 + 1, 2, ());
///         t.done(1);
///         Ok(())
///     })
///     .add_test("truth", |t| {
///         t.ok(true, ()).not_ok(false, ());
///         t.done(2);
///         Ok(())
///     });
/// suite.on("failure", |e: &Event| eprintln!("failed: {:?}", e.message()));
/// suite.run();
/// assert_eq!((suite.assertions(), suite.failures()), (3, 0));
/// ```
#[derive(Clone)]
pub struct Suite(Rc<SuiteState>);

/// Builder for a [`Suite`] with a custom name, configuration or scheduler.
///
/// ```rust
/// use proving::{Config, Immediate, Suite};
///
/// let suite = Suite::builder()
///     .name("integration")
///     .config(Config::default().with_compare_last_index(true))
///     .scheduler(Immediate)
///     .build();
/// assert_eq!(suite.name(), "integration");
/// ```
#[derive(Default)]
pub struct SuiteBuilder {
    name: Option<String>,
    config: Config,
    scheduler: Option<Rc<dyn Scheduler>>,
}

impl SuiteBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use `scheduler` instead of the one selected by the config.
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    pub fn build(self) -> Suite {
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| scheduler::for_scheduling(self.config.scheduling()));
        Suite(Rc::new(SuiteState {
            name: self.name.unwrap_or_else(|| DEFAULT_SUITE_NAME.to_string()),
            slots: RefCell::new(Vec::new()),
            assertions: Cell::new(0),
            failures: Cell::new(0),
            errors: Cell::new(0),
            running: Cell::new(false),
            attachment: RefCell::new(None),
            events: Events::new(),
            config: self.config,
            scheduler,
        }))
    }
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder().name(name).build()
    }

    pub fn with_config(name: impl Into<String>, config: Config) -> Self {
        Self::builder().name(name).config(config).build()
    }

    pub fn builder() -> SuiteBuilder {
        SuiteBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn config(&self) -> &Config {
        &self.0.config
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

    pub fn is_running(&self) -> bool {
        self.0.running.get()
    }

    pub fn ptr_eq(&self, other: &Suite) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Append a test built from `name` and `body`, inheriting the suite's
    /// configuration.
    pub fn add_test<F>(&self, name: impl Into<String>, body: F) -> &Self
    where
        F: Fn(&TestCase) -> Result + 'static,
    {
        self.push(TestCase::with_config(
            Some(name.into()),
            Some(Rc::new(body)),
            &self.0.config,
        ))
    }

    /// Append a test named [`DEFAULT_TEST_NAME`](crate::DEFAULT_TEST_NAME).
    pub fn add_unnamed_test<F>(&self, body: F) -> &Self
    where
        F: Fn(&TestCase) -> Result + 'static,
    {
        self.push(TestCase::with_config(None, Some(Rc::new(body)), &self.0.config))
    }

    pub fn push(&self, test: TestCase) -> &Self {
        self.push_slot(Some(test))
    }

    /// Append a slot; `None` appends a hole.
    pub fn push_slot(&self, slot: Option<TestCase>) -> &Self {
        self.0.slots.borrow_mut().push(slot);
        self
    }

    /// Empty the slot at `index`, leaving a hole, and return its test.
    pub fn take(&self, index: usize) -> Option<TestCase> {
        self.0.slots.borrow_mut().get_mut(index)?.take()
    }

    /// Insert a test at `index`, shifting later slots. An `index` past the
    /// end appends. Ignored while running.
    pub fn insert(&self, index: usize, test: TestCase) -> &Self {
        if self.refuse_while_running("insert") {
            return self;
        }
        let mut slots = self.0.slots.borrow_mut();
        let index = index.min(slots.len());
        slots.insert(index, Some(test));
        self
    }

    /// Remove the slot at `index`, shifting later slots, and return its test.
    /// Ignored while running.
    pub fn remove(&self, index: usize) -> Option<TestCase> {
        if self.refuse_while_running("remove") {
            return None;
        }
        let mut slots = self.0.slots.borrow_mut();
        if index < slots.len() {
            slots.remove(index)
        } else {
            None
        }
    }

    /// Remove the last slot and return its test.
    pub fn pop(&self) -> Option<TestCase> {
        self.0.slots.borrow_mut().pop().flatten()
    }

    /// Reverse the slot order. Ignored while running.
    pub fn reverse(&self) -> &Self {
        if !self.refuse_while_running("reverse") {
            self.0.slots.borrow_mut().reverse();
        }
        self
    }

    fn refuse_while_running(&self, operation: &str) -> bool {
        if self.is_running() {
            tracing::warn!(suite = %self.name(), operation, "cannot reorder a running suite");
        }
        self.is_running()
    }

    pub fn get(&self, index: usize) -> Option<TestCase> {
        self.0.slots.borrow().get(index).cloned().flatten()
    }

    /// Number of slots, holes included.
    pub fn len(&self) -> usize {
        self.0.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The tests in slot order, holes skipped.
    pub fn tests(&self) -> Vec<TestCase> {
        self.0.slots.borrow().iter().flatten().cloned().collect()
    }

    /// Position of the first test at or after `start`.
    ///
    /// A negative `start` counts from the end. Returns `None` when only holes
    /// remain.
    pub fn index_of(&self, start: isize) -> Option<usize> {
        let slots = self.0.slots.borrow();
        let start = if start < 0 {
            slots.len().saturating_sub(start.unsigned_abs())
        } else {
            start.unsigned_abs()
        };
        (start..slots.len()).find(|&i| slots[i].is_some())
    }

    /// Randomize the slot order. Ignored while running.
    pub fn shuffle(&self) -> &Self {
        self.shuffle_with(&mut rand::thread_rng())
    }

    pub fn shuffle_with<R: Rng + ?Sized>(&self, rng: &mut R) -> &Self {
        if !self.refuse_while_running("shuffle") {
            self.0.slots.borrow_mut().shuffle(rng);
        }
        self
    }

    /// Run every test in order. A no-op while already running.
    ///
    /// With the default [`Scheduling::Queued`](crate::Scheduling::Queued)
    /// strategy and synchronous bodies the whole suite has completed when
    /// this returns. With [`Scheduling::Local`](crate::Scheduling::Local)
    /// the tests run on the current `LocalSet`; listen for `complete`.
    pub fn run(&self) -> &Self {
        if self.is_running() {
            tracing::trace!(suite = %self.name(), "suite already running");
            return self;
        }
        self.0.running.set(true);
        self.0.assertions.set(0);
        self.0.failures.set(0);
        self.0.errors.set(0);
        tracing::debug!(suite = %self.name(), slots = self.len(), "suite started");
        self.emit(Channel::START);
        self.advance(0);
        self
    }

    /// Attach a relay to the next test at or after `from` and schedule it.
    ///
    /// The relay observes the test outside its listener registry, so a test
    /// listener that stops dispatch or a body calling `off_all` cannot keep
    /// it from seeing `teardown`.
    fn advance(&self, from: usize) {
        let next = self
            .index_of(isize::try_from(from).unwrap_or(isize::MAX))
            .and_then(|position| Some((position, self.get(position)?)));
        let Some((position, test)) = next else {
            self.finish();
            return;
        };

        let relay = self.relay(position);
        test.events().observe(relay.clone());
        *self.0.attachment.borrow_mut() = Some(Attachment {
            position,
            test: test.clone(),
            relay,
        });

        let timeout = self.0.config.test_timeout();
        let scheduler = self.0.scheduler.clone();
        self.0.scheduler.schedule(Box::new(move || {
            test.run();
            if let Some(timeout) = timeout {
                if test.is_running() {
                    arm_timeout(scheduler.as_ref(), &test, timeout);
                }
            }
        }));
    }

    fn relay(&self, position: usize) -> Listener {
        let suite: Weak<SuiteState> = Rc::downgrade(&self.0);
        Listener::new(move |event: &Event| {
            if let Some(state) = suite.upgrade() {
                Suite(state).relay_event(position, event);
            }
        })
    }

    fn relay_event(&self, position: usize, event: &Event) {
        if event.tallied {
            let channel = event.channel();
            let counter = if *channel == Channel::ASSERTION {
                Some(&self.0.assertions)
            } else if *channel == Channel::FAILURE {
                Some(&self.0.failures)
            } else if *channel == Channel::ERROR {
                Some(&self.0.errors)
            } else {
                None
            };
            if let Some(counter) = counter {
                counter.set(counter.get() + 1);
            }
        }

        self.emit_event(event.clone());

        if *event.channel() != Channel::TEARDOWN {
            return;
        }
        let finished = self
            .0
            .attachment
            .borrow_mut()
            .take_if(|a| a.position == position && !a.test.is_running());
        if let Some(Attachment { test, relay, .. }) = finished {
            test.events().unobserve(&relay);
            self.advance(position + 1);
        }
    }

    fn finish(&self) {
        self.0.running.set(false);
        tracing::debug!(
            suite = %self.name(),
            assertions = self.assertions(),
            failures = self.failures(),
            errors = self.errors(),
            "suite finished"
        );
        self.emit(Channel::COMPLETE);
    }
}

fn arm_timeout(scheduler: &dyn Scheduler, test: &TestCase, timeout: Duration) {
    let generation = test.generation();
    let watched = test.clone();
    let watchdog: Task = Box::new(move || {
        if watched.is_running() && watched.generation() == generation {
            tracing::warn!(test = %watched.name(), ?timeout, "test timed out");
            watched.abort(Error::Timeout(timeout));
        }
    });
    if !scheduler.schedule_after(timeout, watchdog) {
        tracing::warn!(
            test = %test.name(),
            "scheduler cannot delay tasks; test timeout not enforced"
        );
    }
}

impl Default for Suite {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Emitter for Suite {
    fn events(&self) -> &Events {
        &self.0.events
    }

    fn as_target(&self) -> Target {
        Target::Suite(self.clone())
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name())
            .field("slots", &self.len())
            .field("running", &self.is_running())
            .field("assertions", &self.assertions())
            .field("failures", &self.failures())
            .field("errors", &self.errors())
            .finish()
    }
}

impl From<Suite> for Target {
    fn from(suite: Suite) -> Self {
        Target::Suite(suite)
    }
}
