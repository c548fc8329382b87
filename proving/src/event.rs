use std::{borrow::Cow, fmt};

use uuid::Uuid;

use crate::{Error, Events, Suite, TestCase, Value};

/// Unique identifier of an emitted [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventId(Uuid);

impl EventId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        EventId::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Name of an event category, e.g. `assertion` or `teardown`.
///
/// Channel names never contain whitespace: a string with several
/// whitespace-separated names addresses several channels at once.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Channel(Cow<'static, str>);

impl Channel {
    /// Wildcard: listeners here receive every event.
    pub const ALL: Channel = Channel(Cow::Borrowed("all"));
    pub const START: Channel = Channel(Cow::Borrowed("start"));
    pub const SETUP: Channel = Channel(Cow::Borrowed("setup"));
    pub const ASSERTION: Channel = Channel(Cow::Borrowed("assertion"));
    pub const FAILURE: Channel = Channel(Cow::Borrowed("failure"));
    pub const ERROR: Channel = Channel(Cow::Borrowed("error"));
    pub const TEARDOWN: Channel = Channel(Cow::Borrowed("teardown"));
    pub const COMPLETE: Channel = Channel(Cow::Borrowed("complete"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Channel::ALL
    }

    /// A usable channel name is non-empty and has no whitespace.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && !self.0.chars().any(char::is_whitespace)
    }

    /// Splits a whitespace-separated list of names.
    pub(crate) fn parse_list(channels: &str) -> Vec<Channel> {
        channels
            .split_whitespace()
            .map(|name| Channel::new(name.to_string()))
            .collect()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Channel {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Channel {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        Channel::new(name.to_string())
    }
}

impl From<String> for Channel {
    fn from(name: String) -> Self {
        Channel::new(name)
    }
}

/// The object an event is about. Compared by identity.
#[derive(Clone)]
pub enum Target {
    Hub(Events),
    Test(TestCase),
    Suite(Suite),
    /// An explicit target supplied by whoever built the event.
    Value(Value),
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Target::Hub(a), Target::Hub(b)) => a.ptr_eq(b),
            (Target::Test(a), Target::Test(b)) => a.ptr_eq(b),
            (Target::Suite(a), Target::Suite(b)) => a.ptr_eq(b),
            (Target::Value(a), Target::Value(b)) => a.strict_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Hub(_) => f.write_str("Hub"),
            Target::Test(test) => f.debug_tuple("Test").field(&test.name()).finish(),
            Target::Suite(suite) => f.debug_tuple("Suite").field(&suite.name()).finish(),
            Target::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

impl From<Value> for Target {
    fn from(value: Value) -> Self {
        Target::Value(value)
    }
}

/// A single notification flowing through an [`Events`] hub.
///
/// Built from a channel name (`"setup".into()`) or with the `with_*`
/// builders. `target` is filled in with the emitter when left empty.
#[derive(Debug, Clone)]
pub struct Event {
    id: EventId,
    channel: Channel,
    target: Option<Target>,
    actual: Option<Value>,
    expected: Option<Value>,
    message: Option<String>,
    error: Option<Error>,
    fields: Vec<(String, Value)>,
    /// Set by a running test once it has counted this event.
    pub(crate) tallied: bool,
}

impl Event {
    pub fn new(channel: impl Into<Channel>) -> Self {
        Self {
            id: EventId::new(),
            channel: channel.into(),
            target: None,
            actual: None,
            expected: None,
            message: None,
            error: None,
            fields: Vec::new(),
            tallied: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<Target>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_actual(mut self, actual: impl Into<Value>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<Value>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    /// Attach an arbitrary named payload field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    #[inline]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// The test this event is about, if any.
    pub fn test(&self) -> Option<&TestCase> {
        match &self.target {
            Some(Target::Test(test)) => Some(test),
            _ => None,
        }
    }

    /// The suite this event is about, if any.
    pub fn suite(&self) -> Option<&Suite> {
        match &self.target {
            Some(Target::Suite(suite)) => Some(suite),
            _ => None,
        }
    }

    pub fn actual(&self) -> Option<&Value> {
        self.actual.as_ref()
    }

    pub fn expected(&self) -> Option<&Value> {
        self.expected.as_ref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub(crate) fn set_target_if_absent(&mut self, target: impl FnOnce() -> Target) {
        if self.target.is_none() {
            self.target = Some(target());
        }
    }
}

impl From<Channel> for Event {
    fn from(channel: Channel) -> Self {
        Event::new(channel)
    }
}

impl From<&str> for Event {
    fn from(channel: &str) -> Self {
        Event::new(channel)
    }
}

impl From<String> for Event {
    fn from(channel: String) -> Self {
        Event::new(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_lists_split_on_whitespace() {
        let channels = Channel::parse_list(" setup  teardown\tall ");
        assert_eq!(channels, [Channel::SETUP, Channel::TEARDOWN, Channel::ALL]);
        assert!(Channel::parse_list("   ").is_empty());
        assert!(channels[2].is_wildcard());
    }

    #[test]
    fn channel_validity() {
        assert!(Channel::from("custom").is_valid());
        assert!(!Channel::from("").is_valid());
        assert!(!Channel::from("two words").is_valid());
    }

    #[test]
    fn owned_and_borrowed_channels_are_equal() {
        assert_eq!(Channel::from("failure".to_string()), Channel::FAILURE);
    }

    #[test]
    fn event_builders() {
        let event = Event::new(Channel::FAILURE)
            .with_actual(1)
            .with_expected(2)
            .with_message("done")
            .with_field("extra", "x");
        assert_eq!(event.channel(), &Channel::FAILURE);
        assert_eq!(event.actual(), Some(&Value::from(1)));
        assert_eq!(event.expected(), Some(&Value::from(2)));
        assert_eq!(event.message(), Some("done"));
        assert_eq!(event.field("extra"), Some(&Value::from("x")));
        assert!(event.target().is_none());
        assert!(event.test().is_none());
    }

    #[test]
    fn event_ids_are_unique() {
        assert_ne!(Event::new("a").id(), Event::new("a").id());
    }

    #[test]
    fn explicit_target_wins() {
        let explicit = Value::from("custom");
        let mut event = Event::new("x").with_target(explicit.clone());
        event.set_target_if_absent(|| Target::Hub(Events::new()));
        assert_eq!(event.target(), Some(&Target::Value(explicit)));
    }
}
