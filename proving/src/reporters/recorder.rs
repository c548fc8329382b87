use std::cell::RefCell;

use crate::{Channel, Event, reporters::Reporter};

/// A reporter that keeps every event it receives, in order.
///
/// Useful for asserting on the exact event stream of a run.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
/// use proving::{Suite, reporters::{self, Recorder}};
///
/// let suite = Suite::new("empty");
/// let recorder = Rc::new(Recorder::new());
/// reporters::attach(&suite, recorder.clone());
/// suite.run();
/// assert_eq!(recorder.channels(), ["start", "complete"]);
/// ```
#[derive(Debug, Default)]
pub struct Recorder {
    events: RefCell<Vec<Event>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the recorded events.
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.events
            .borrow()
            .iter()
            .map(|e| e.channel().clone())
            .collect()
    }

    /// Number of recorded events on `channel`.
    pub fn count(&self, channel: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.channel().as_str() == channel)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl Reporter for Recorder {
    fn on_event(&self, event: &Event) {
        match self.events.try_borrow_mut() {
            Ok(mut events) => events.push(event.clone()),
            Err(_) => tracing::warn!(channel = %event.channel(), "Recorder failed to borrow event log"),
        }
    }
}

#[cfg(feature = "serde")]
#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
impl Recorder {
    /// Write the recorded events in JSON Lines format, one object per event.
    ///
    /// Values that cannot be rendered (cyclic structures) are written as
    /// their display string.
    pub fn write_json_lines<W: std::io::Write>(&self, mut writer: W) -> crate::Result {
        for event in self.events.borrow().iter() {
            serde_json::to_writer(&mut writer, &json_event(event)).map_err(crate::Error::external)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(feature = "serde")]
fn json_event(event: &Event) -> serde_json::Value {
    use crate::{Target, Value};

    let render = |value: &Value| {
        value
            .to_json()
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()))
    };
    let target = match event.target() {
        Some(Target::Test(test)) => serde_json::json!({ "test": test.name() }),
        Some(Target::Suite(suite)) => serde_json::json!({ "suite": suite.name() }),
        Some(Target::Value(value)) => render(value),
        Some(Target::Hub(_)) | None => serde_json::Value::Null,
    };
    let mut object = serde_json::json!({
        "id": event.id(),
        "channel": event.channel(),
        "target": target,
    });
    if let Some(map) = object.as_object_mut() {
        if let Some(actual) = event.actual() {
            map.insert("actual".into(), render(actual));
        }
        if let Some(expected) = event.expected() {
            map.insert("expected".into(), render(expected));
        }
        if let Some(message) = event.message() {
            map.insert("message".into(), message.into());
        }
        if let Some(error) = event.error() {
            map.insert("error".into(), error.to_string().into());
        }
    }
    object
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{Emitter, Events, Suite, reporters::attach};

    fn recorded_run() -> Rc<Recorder> {
        let suite = Suite::new("S");
        suite
            .add_test("a", |t| {
                t.equal("x", "x", ());
                t.done(1);
                Ok(())
            })
            .add_test("b", |t| {
                t.deep_equal(crate::seq![1, 2], crate::seq![1, 3], "lists");
                t.done(0);
                Ok(())
            });
        let recorder = Rc::new(Recorder::new());
        attach(&suite, recorder.clone());
        suite.run();
        recorder
    }

    #[test]
    fn records_in_order() {
        let recorder = recorded_run();
        assert_eq!(
            recorder.channels(),
            [
                "start", "setup", "assertion", "teardown", "setup", "failure", "teardown",
                "complete"
            ]
        );
        assert_eq!(recorder.count("setup"), 2);
        assert_eq!(recorder.len(), 8);

        let failure = &recorder.events()[5];
        assert_eq!(failure.message(), Some("lists"));
        assert_eq!(failure.test().map(|t| t.name().to_string()), Some("b".into()));
    }

    #[test]
    fn clear_empties_the_log() {
        let events = Events::new();
        let recorder = Rc::new(Recorder::new());
        attach(&events, recorder.clone());
        events.emit("x").emit("x");
        assert_eq!(recorder.count("x"), 2);
        recorder.clear();
        assert!(recorder.is_empty());
        events.emit("y");
        assert_eq!(recorder.channels(), ["y"]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn writes_json_lines() {
        let recorder = recorded_run();
        let mut out = Vec::new();
        recorder.write_json_lines(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0]["channel"], "start");
        assert_eq!(lines[0]["target"]["suite"], "S");
        assert_eq!(lines[5]["actual"], serde_json::json!([1, 2]));
        assert_eq!(lines[5]["expected"], serde_json::json!([1, 3]));
        assert_eq!(lines[5]["message"], "lists");
        assert_eq!(lines[6]["target"]["test"], "b");
    }
}
