use std::{fmt, rc::Rc};

use crate::{
    Error, Pattern, Result, TestCase, Value,
    error::capture,
    test_case::Message,
};

/// What [`TestCase::error`] expects the block to fail with.
#[derive(Clone, Default)]
pub enum Expect {
    /// Any error will do.
    #[default]
    Any,
    /// The error's string form must match.
    Pattern(Rc<Pattern>),
    /// The predicate must return `true` for the error.
    Predicate(Rc<dyn Fn(&Error, &TestCase) -> bool>),
    /// Not a matcher: a message passed where the matcher goes.
    ///
    /// Without an explicit message it becomes the assertion message and any
    /// error matches. Alongside an explicit message nothing matches.
    Message(String),
}

impl Expect {
    pub fn predicate(f: impl Fn(&Error, &TestCase) -> bool + 'static) -> Self {
        Expect::Predicate(Rc::new(f))
    }

    fn matches(&self, error: &Error, test: &TestCase) -> bool {
        match self {
            Expect::Any => true,
            Expect::Pattern(pattern) => pattern.test(&error.to_string()),
            Expect::Predicate(predicate) => {
                capture(|| Ok(predicate(error, test))).unwrap_or_else(|panic| {
                    tracing::debug!(test = %test.name(), error = %panic, "error predicate panicked");
                    false
                })
            }
            Expect::Message(_) => false,
        }
    }
}

impl fmt::Debug for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expect::Any => f.write_str("Any"),
            Expect::Pattern(p) => f.debug_tuple("Pattern").field(&p.to_string()).finish(),
            Expect::Predicate(_) => f.write_str("Predicate"),
            Expect::Message(m) => f.debug_tuple("Message").field(m).finish(),
        }
    }
}

impl From<()> for Expect {
    fn from(_: ()) -> Self {
        Expect::Any
    }
}

impl From<Pattern> for Expect {
    fn from(pattern: Pattern) -> Self {
        Expect::Pattern(Rc::new(pattern))
    }
}

impl From<Rc<Pattern>> for Expect {
    fn from(pattern: Rc<Pattern>) -> Self {
        Expect::Pattern(pattern)
    }
}

impl From<&str> for Expect {
    fn from(message: &str) -> Self {
        Expect::Message(message.to_string())
    }
}

impl From<String> for Expect {
    fn from(message: String) -> Self {
        Expect::Message(message)
    }
}

/// Derived assertions. Each records through [`TestCase::assert`] or
/// [`TestCase::fail`] with its own name as the default message.
impl TestCase {
    fn check(&self, passed: bool, actual: Value, expected: Value, message: Message) -> &Self {
        if passed {
            self.assert(actual, expected, message)
        } else {
            self.fail(actual, expected, message)
        }
    }

    /// Passes when `value` is truthy.
    pub fn ok(&self, value: impl Into<Value>, message: impl Into<Message>) -> &Self {
        let value = value.into();
        self.check(value.is_truthy(), value, true.into(), message.into().or("ok"))
    }

    /// Passes when `value` is falsy.
    pub fn not_ok(&self, value: impl Into<Value>, message: impl Into<Message>) -> &Self {
        let value = value.into();
        self.check(!value.is_truthy(), value, false.into(), message.into().or("notOk"))
    }

    /// Strict equality (`===`).
    pub fn equal(
        &self,
        actual: impl Into<Value>,
        expected: impl Into<Value>,
        message: impl Into<Message>,
    ) -> &Self {
        let (actual, expected) = (actual.into(), expected.into());
        let passed = actual.strict_eq(&expected);
        self.check(passed, actual, expected, message.into().or("equal"))
    }

    pub fn not_equal(
        &self,
        actual: impl Into<Value>,
        expected: impl Into<Value>,
        message: impl Into<Message>,
    ) -> &Self {
        let (actual, expected) = (actual.into(), expected.into());
        let passed = !actual.strict_eq(&expected);
        self.check(passed, actual, expected, message.into().or("notEqual"))
    }

    /// Coercive equality (`==`).
    pub fn loose_equal(
        &self,
        actual: impl Into<Value>,
        expected: impl Into<Value>,
        message: impl Into<Message>,
    ) -> &Self {
        let (actual, expected) = (actual.into(), expected.into());
        let passed = actual.loose_eq(&expected);
        self.check(passed, actual, expected, message.into().or("looseEqual"))
    }

    pub fn not_loose_equal(
        &self,
        actual: impl Into<Value>,
        expected: impl Into<Value>,
        message: impl Into<Message>,
    ) -> &Self {
        let (actual, expected) = (actual.into(), expected.into());
        let passed = !actual.loose_eq(&expected);
        self.check(passed, actual, expected, message.into().or("notLooseEqual"))
    }

    /// Structural equality, see [`Comparator`](crate::Comparator).
    pub fn deep_equal(
        &self,
        actual: impl Into<Value>,
        expected: impl Into<Value>,
        message: impl Into<Message>,
    ) -> &Self {
        let (actual, expected) = (actual.into(), expected.into());
        let passed = self.comparator().deep_equal(&actual, &expected);
        self.check(passed, actual, expected, message.into().or("deepEqual"))
    }

    pub fn not_deep_equal(
        &self,
        actual: impl Into<Value>,
        expected: impl Into<Value>,
        message: impl Into<Message>,
    ) -> &Self {
        let (actual, expected) = (actual.into(), expected.into());
        let passed = !self.comparator().deep_equal(&actual, &expected);
        self.check(passed, actual, expected, message.into().or("notDeepEqual"))
    }

    /// Passes when `block` fails (returns `Err` or panics) in the way
    /// `expected` describes.
    ///
    /// ```rust
    /// use proving::{Error, Expect, Pattern, TestCase};
    ///
    /// let test = TestCase::new("errors", |t| {
    ///     t.error(|| Err::<(), _>(Error::type_error("bad")), Pattern::new("^TypeError", "")?, ());
    ///     t.error(|| Err::<(), _>(Error::new("x")), Expect::predicate(|e, _| e.name() == "Error"), ());
    ///     t.error(|| -> proving::Result { panic!("boom") }, "any error will do", ());
    ///     t.done(3);
    ///     Ok(())
    /// });
    /// test.run();
    /// assert_eq!(test.assertions(), 3);
    /// ```
    pub fn error<T>(
        &self,
        block: impl FnOnce() -> Result<T>,
        expected: impl Into<Expect>,
        message: impl Into<Message>,
    ) -> &Self {
        let mut expected = expected.into();
        let mut message = message.into();
        if let (Expect::Message(text), None) = (&expected, &message.0) {
            message = Message(Some(text.clone()));
            expected = Expect::Any;
        }
        let passed = match capture(block) {
            Ok(_) => false,
            Err(error) => expected.matches(&error, self),
        };
        self.ok(passed, message.or("error"))
    }

    /// Passes when `block` succeeds.
    pub fn no_error<T>(&self, block: impl FnOnce() -> Result<T>, message: impl Into<Message>) -> &Self {
        let passed = capture(block).is_ok();
        self.ok(passed, message.into().or("noError"))
    }
}
