use std::{
    cell::{Ref, RefCell},
    fmt,
    io::{self, Write},
};

use crate::{Event, TestCase, Value, reporters::Reporter};

/// A reporter that writes one human readable line per event.
///
/// ```text
/// Started suite `math`.
/// Started test `addition`.
/// Assertion: equal.
/// Finished test `addition`. 1 assertions, 0 failures, 0 errors.
/// Finished suite `math`. 1 assertions, 0 failures, 0 errors.
/// ```
///
/// Write failures are logged and otherwise ignored.
pub struct Console<W: Write> {
    writer: RefCell<W>,
}

impl Console<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Console<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: RefCell::new(writer),
        }
    }

    pub fn writer(&self) -> Ref<'_, W> {
        self.writer.borrow()
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn line(&self, args: fmt::Arguments<'_>) {
        let Ok(mut writer) = self.writer.try_borrow_mut() else {
            tracing::warn!("Console failed to borrow writer");
            return;
        };
        if let Err(e) = writer.write_fmt(args).and_then(|()| writer.write_all(b"\n")) {
            tracing::warn!("Console failed to write: {}", e);
        }
    }
}

/// Renders a payload value, as JSON when possible.
fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Undefined) => "undefined".to_string(),
        #[cfg(feature = "serde")]
        Some(value) => value
            .to_json()
            .map_or_else(|_| format!("{value:?}"), |json| json.to_string()),
        #[cfg(not(feature = "serde"))]
        Some(value) => format!("{value:?}"),
    }
}

fn target_name(event: &Event) -> &str {
    event.suite().map_or("", |suite| suite.name())
}

impl<W: Write> Reporter for Console<W> {
    fn on_start(&self, event: &Event) {
        self.line(format_args!("Started suite `{}`.", target_name(event)));
    }

    fn on_setup(&self, test: &TestCase, _event: &Event) {
        self.line(format_args!("Started test `{}`.", test.name()));
    }

    fn on_assertion(&self, event: &Event) {
        self.line(format_args!(
            "Assertion: {}.",
            event.message().unwrap_or_default()
        ));
    }

    fn on_failure(&self, event: &Event) {
        self.line(format_args!(
            "Failure: {}. Expected: {}. Actual: {}.",
            event.message().unwrap_or_default(),
            render(event.expected()),
            render(event.actual()),
        ));
    }

    fn on_error(&self, event: &Event) {
        match event.error() {
            Some(error) => self.line(format_args!("Error: {error}")),
            None => self.line(format_args!("Error.")),
        }
    }

    fn on_teardown(&self, test: &TestCase, _event: &Event) {
        self.line(format_args!(
            "Finished test `{}`. {} assertions, {} failures, {} errors.",
            test.name(),
            test.assertions(),
            test.failures(),
            test.errors(),
        ));
    }

    fn on_complete(&self, event: &Event) {
        match event.suite() {
            Some(suite) => self.line(format_args!(
                "Finished suite `{}`. {} assertions, {} failures, {} errors.",
                suite.name(),
                suite.assertions(),
                suite.failures(),
                suite.errors(),
            )),
            None => self.line(format_args!("Finished.")),
        }
    }
}

impl<W: Write> fmt::Debug for Console<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{Error, Suite, reporters::attach};

    fn output(console: &Console<Vec<u8>>) -> Vec<String> {
        String::from_utf8_lossy(&console.writer())
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn formats_a_run() {
        let suite = Suite::new("math");
        suite
            .add_test("addition", |t| {
                t.equal(1 + 1, 2, ());
                t.done(1);
                Ok(())
            })
            .add_test("broken", |t| {
                t.equal("a", "b", "letters");
                Err(Error::type_error("nope"))
            });
        let console = Rc::new(Console::new(Vec::new()));
        attach(&suite, console.clone());
        suite.run();

        let lines = output(&console);
        assert_eq!(
            lines,
            [
                "Started suite `math`.",
                "Started test `addition`.",
                "Assertion: equal.",
                "Finished test `addition`. 1 assertions, 0 failures, 0 errors.",
                "Started test `broken`.",
                r#"Failure: letters. Expected: "b". Actual: "a"."#,
                "Error: TypeError: nope",
                "Finished test `broken`. 0 assertions, 1 failures, 1 errors.",
                "Finished suite `math`. 1 assertions, 1 failures, 1 errors.",
            ]
        );
    }

    #[test]
    fn renders_missing_payloads_as_undefined() {
        assert_eq!(render(None), "undefined");
        assert_eq!(render(Some(&Value::Undefined)), "undefined");
        assert_eq!(render(Some(&Value::from(1.5))), "1.5");
    }
}
