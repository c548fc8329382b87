//! Ready-to-use reporters.
//!
//! A [`Reporter`] receives every event an emitter produces, routed to one
//! hook per channel. Attach it to a [`Suite`](crate::Suite) to observe a
//! whole run, or to a single [`TestCase`].
//!
//! # Available Reporters
//!
//! - [`Tracer`] - Logs events via the `tracing` crate
//! - [`Recorder`] - Keeps every event in memory
//! - [`Console`] - Writes a human readable line per event
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use proving::{Suite, reporters::{self, Recorder}};
//!
//! let suite = Suite::new("demo");
//! suite.add_test("truth", |t| {
//!     t.ok(true, ());
//!     t.done(1);
//!     Ok(())
//! });
//! let recorder = Rc::new(Recorder::new());
//! reporters::attach(&suite, recorder.clone());
//! suite.run();
//! assert_eq!(recorder.count("assertion"), 1);
//! ```

use std::rc::Rc;

use crate::{Channel, Emitter, Event, Listener, TestCase};

mod console;
pub use console::Console;

mod recorder;
pub use recorder::Recorder;

mod tracer;
pub use tracer::Tracer;

/// Hooks invoked for the events of an emitter.
///
/// All hooks have empty default implementations, so a reporter only needs
/// to override the channels it cares about. Overriding [`Reporter::on_event`]
/// bypasses the per-channel routing.
pub trait Reporter {
    /// Called for every event. Routes to the per-channel hooks by default.
    fn on_event(&self, event: &Event) {
        route(self, event);
    }

    fn on_start(&self, _event: &Event) {}

    fn on_setup(&self, _test: &TestCase, _event: &Event) {}

    fn on_assertion(&self, _event: &Event) {}

    fn on_failure(&self, _event: &Event) {}

    fn on_error(&self, _event: &Event) {}

    fn on_teardown(&self, _test: &TestCase, _event: &Event) {}

    fn on_complete(&self, _event: &Event) {}

    /// Events on channels without a dedicated hook.
    fn on_other(&self, _event: &Event) {}
}

fn route<R: Reporter + ?Sized>(reporter: &R, event: &Event) {
    let channel = event.channel();
    if *channel == Channel::START {
        reporter.on_start(event);
    } else if *channel == Channel::ASSERTION {
        reporter.on_assertion(event);
    } else if *channel == Channel::FAILURE {
        reporter.on_failure(event);
    } else if *channel == Channel::ERROR {
        reporter.on_error(event);
    } else if *channel == Channel::COMPLETE {
        reporter.on_complete(event);
    } else if let Some(test) = event.test().filter(|_| *channel == Channel::SETUP) {
        reporter.on_setup(test, event);
    } else if let Some(test) = event.test().filter(|_| *channel == Channel::TEARDOWN) {
        reporter.on_teardown(test, event);
    } else {
        reporter.on_other(event);
    }
}

/// Register `reporter` on the wildcard channel of `emitter`.
///
/// Returns the registered listener; pass it to
/// [`Emitter::off_listener`] with `"all"` to detach the reporter.
pub fn attach<E, R>(emitter: &E, reporter: Rc<R>) -> Listener
where
    E: Emitter,
    R: Reporter + 'static,
{
    let listener = Listener::new(move |event: &Event| reporter.on_event(event));
    emitter.add_listener(Channel::ALL.as_str(), &listener);
    listener
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::{Events, Suite};

    #[derive(Default)]
    struct Hooks(RefCell<Vec<String>>);

    impl Reporter for Hooks {
        fn on_start(&self, _: &Event) {
            self.0.borrow_mut().push("start".into());
        }

        fn on_setup(&self, test: &TestCase, _: &Event) {
            self.0.borrow_mut().push(format!("setup {}", test.name()));
        }

        fn on_teardown(&self, test: &TestCase, _: &Event) {
            self.0.borrow_mut().push(format!("teardown {}", test.name()));
        }

        fn on_complete(&self, _: &Event) {
            self.0.borrow_mut().push("complete".into());
        }

        fn on_other(&self, event: &Event) {
            self.0.borrow_mut().push(format!("other {}", event.channel()));
        }
    }

    #[test]
    fn routes_by_channel() {
        let suite = Suite::new("S");
        suite.add_test("T", |t| {
            t.ok(true, ());
            t.done(1);
            Ok(())
        });
        let hooks = Rc::new(Hooks::default());
        attach(&suite, hooks.clone());
        suite.emit("custom").run();
        assert_eq!(
            *hooks.0.borrow(),
            ["other custom", "start", "setup T", "teardown T", "complete"]
        );
    }

    #[test]
    fn teardown_without_a_test_target_is_other() {
        let events = Events::new();
        let hooks = Rc::new(Hooks::default());
        attach(&events, hooks.clone());
        events.emit("teardown");
        assert_eq!(*hooks.0.borrow(), ["other teardown"]);
    }

    #[test]
    fn detaching_stops_reports() {
        let events = Events::new();
        let hooks = Rc::new(Hooks::default());
        let listener = attach(&events, hooks.clone());
        events.off_listener("all", &listener).emit("start");
        assert!(hooks.0.borrow().is_empty());
        assert!(events.is_empty());
    }
}
