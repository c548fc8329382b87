use crate::{Event, Target, TestCase, reporters::Reporter};

/// A reporter that logs every event to the `tracing` crate.
///
/// Log levels:
/// - `trace` - passed assertions and unrecognized channels (high volume)
/// - `debug` - test setup and teardown
/// - `info` - suite start and completion
/// - `warn` - failed assertions
/// - `error` - errors
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
/// use proving::{Suite, reporters::{self, Tracer}};
///
/// let suite = Suite::new("traced");
/// reporters::attach(&suite, Rc::new(Tracer));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct Tracer;

fn owner(event: &Event) -> &str {
    match event.target() {
        Some(Target::Test(test)) => test.name(),
        Some(Target::Suite(suite)) => suite.name(),
        _ => "",
    }
}

impl Reporter for Tracer {
    fn on_start(&self, event: &Event) {
        tracing::info!(event_id = %event.id(), suite = %owner(event), "suite started");
    }

    fn on_setup(&self, test: &TestCase, event: &Event) {
        tracing::debug!(event_id = %event.id(), test = %test.name(), "test started");
    }

    fn on_assertion(&self, event: &Event) {
        tracing::trace!(
            event_id = %event.id(),
            test = %owner(event),
            message = event.message().unwrap_or_default(),
            "assertion passed"
        );
    }

    fn on_failure(&self, event: &Event) {
        tracing::warn!(
            event_id = %event.id(),
            test = %owner(event),
            message = event.message().unwrap_or_default(),
            actual = ?event.actual(),
            expected = ?event.expected(),
            "assertion failed"
        );
    }

    fn on_error(&self, event: &Event) {
        tracing::error!(
            event_id = %event.id(),
            test = %owner(event),
            error = ?event.error(),
            "error"
        );
    }

    fn on_teardown(&self, test: &TestCase, event: &Event) {
        tracing::debug!(
            event_id = %event.id(),
            test = %test.name(),
            assertions = test.assertions(),
            failures = test.failures(),
            errors = test.errors(),
            "test finished"
        );
    }

    fn on_complete(&self, event: &Event) {
        match event.suite() {
            Some(suite) => tracing::info!(
                event_id = %event.id(),
                suite = %suite.name(),
                assertions = suite.assertions(),
                failures = suite.failures(),
                errors = suite.errors(),
                "suite completed"
            ),
            None => tracing::info!(event_id = %event.id(), "complete"),
        }
    }

    fn on_other(&self, event: &Event) {
        tracing::trace!(event_id = %event.id(), channel = %event.channel(), "event");
    }
}
