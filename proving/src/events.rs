use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
};

use crate::{
    Channel, Emitter, Event, Target, Value,
    listener::{Flow, Listener},
};

#[derive(Clone)]
struct Registration {
    listener: Listener,
    /// Key for `off_bound`; never passed to the listener.
    context: Option<Value>,
}

impl Registration {
    fn matches(&self, listener: &Listener, context: Option<&Value>) -> bool {
        self.listener.matches(listener)
            && context.is_none_or(|c| self.context.as_ref().is_some_and(|own| own.strict_eq(c)))
    }
}

type Registry = HashMap<Channel, Vec<Registration>>;

/// A standalone event hub.
///
/// `Events` keeps, per channel, the listeners in registration order. Emitting
/// an event invokes the channel's listeners and then those on the wildcard
/// channel `all`. Both lists are copied before the first call, so listeners
/// added or removed while an event is being dispatched only take effect for
/// the next emit.
///
/// [`TestCase`](crate::TestCase) and [`Suite`](crate::Suite) each embed one
/// and expose it through the [`Emitter`] trait, which is also where all the
/// registration methods live.
///
/// Cloning an `Events` yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct Events {
    registry: Rc<RefCell<Registry>>,
    /// Crate-internal listeners that see every event after both passes.
    /// Neither `Flow::Stop` nor `off_all` reaches them.
    observers: Rc<RefCell<Vec<Listener>>>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ptr_eq(&self, other: &Events) -> bool {
        Rc::ptr_eq(&self.registry, &other.registry)
    }

    /// True when no listener is registered on any channel.
    pub fn is_empty(&self) -> bool {
        self.registry.borrow().is_empty()
    }

    pub fn has_listeners(&self, channel: &str) -> bool {
        self.listener_count(channel) > 0
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.registry
            .borrow()
            .get(&Channel::from(channel))
            .map_or(0, Vec::len)
    }

    pub(crate) fn register(&self, channels: &str, listener: Listener, context: Option<Value>) {
        let mut registry = self.registry.borrow_mut();
        for channel in Channel::parse_list(channels) {
            registry.entry(channel).or_default().push(Registration {
                listener: listener.clone(),
                context: context.clone(),
            });
        }
    }

    pub(crate) fn register_once(&self, channels: &str, listener: Listener) {
        let registry = Rc::downgrade(&self.registry);
        let owned = channels.to_string();
        let wrapper = Listener::once(listener, move |me| {
            if let Some(registry) = Weak::upgrade(&registry) {
                let events = Events {
                    registry,
                    observers: Rc::default(),
                };
                events.remove(&owned, Some(me), None);
            }
        });
        self.register(channels, wrapper, None);
    }

    /// Removes registrations on each listed channel.
    ///
    /// Without a listener every registration on the channel goes. With one,
    /// only registrations of that listener (and, if given, bound to an equal
    /// context) are dropped. Emptied channels are deleted.
    pub(crate) fn remove(&self, channels: &str, listener: Option<&Listener>, context: Option<&Value>) {
        let mut registry = self.registry.borrow_mut();
        for channel in Channel::parse_list(channels) {
            let Some(listener) = listener else {
                registry.remove(&channel);
                continue;
            };
            if let Some(registrations) = registry.get_mut(&channel) {
                registrations.retain(|r| !r.matches(listener, context));
                if registrations.is_empty() {
                    registry.remove(&channel);
                }
            }
        }
    }

    pub(crate) fn clear(&self) {
        self.registry.borrow_mut().clear();
    }

    pub(crate) fn observe(&self, listener: Listener) {
        self.observers.borrow_mut().push(listener);
    }

    pub(crate) fn unobserve(&self, listener: &Listener) {
        self.observers.borrow_mut().retain(|o| !o.ptr_eq(listener));
    }

    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.borrow().is_empty()
    }

    fn snapshot(&self, channel: &Channel) -> Vec<Registration> {
        self.registry
            .borrow()
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Delivers `event` to this hub's listeners on behalf of `origin`.
    ///
    /// Listener failures are re-emitted through `origin` as `error` events
    /// carrying the same target; a failure while handling an `error` event is
    /// only logged.
    pub(crate) fn dispatch<E: Emitter + ?Sized>(&self, mut event: Event, origin: &E) {
        if !event.channel().is_valid() {
            tracing::trace!(channel = ?event.channel().as_str(), "ignoring malformed channel");
            return;
        }
        event.set_target_if_absent(|| origin.as_target());
        self.dispatch_pass(event.channel(), &event, origin);
        if !event.channel().is_wildcard() {
            self.dispatch_pass(&Channel::ALL, &event, origin);
        }

        let observers = self.observers.borrow().clone();
        for observer in observers {
            if let Err(error) = observer.invoke(&event) {
                tracing::warn!(channel = %event.channel(), error = %error, "observer failed");
            }
        }
    }

    fn dispatch_pass<E: Emitter + ?Sized>(&self, channel: &Channel, event: &Event, origin: &E) {
        for registration in self.snapshot(channel) {
            match registration.listener.invoke(event) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(error) if *event.channel() == Channel::ERROR => {
                    tracing::warn!(
                        channel = %channel,
                        error = %error,
                        "listener failed while handling an error event"
                    );
                }
                Err(error) => {
                    tracing::debug!(
                        channel = %channel,
                        event = %event.channel(),
                        error = %error,
                        "listener failed"
                    );
                    let mut failure = Event::new(Channel::ERROR).with_error(error);
                    if let Some(target) = event.target() {
                        failure = failure.with_target(target.clone());
                    }
                    origin.emit_event(failure);
                }
            }
        }
    }
}

impl Emitter for Events {
    fn events(&self) -> &Events {
        self
    }

    fn as_target(&self) -> Target {
        Target::Hub(self.clone())
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        let mut channels: Vec<_> = registry
            .iter()
            .map(|(channel, list)| (channel.as_str(), list.len()))
            .collect();
        channels.sort_unstable();
        f.debug_struct("Events").field("channels", &channels).finish()
    }
}

impl From<Events> for Target {
    fn from(events: Events) -> Self {
        Target::Hub(events)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::{Error, Result};

    fn counter() -> (Rc<Cell<usize>>, impl Fn(&Event) + Clone + 'static) {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        (count, move |_: &Event| c.set(c.get() + 1))
    }

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn on_and_emit() {
        let events = Events::new();
        let (count, inc) = counter();
        events.on("event", inc);
        events.emit("event");
        assert_eq!(count.get(), 1);
        events.emit("event").emit("event").emit("event").emit("event");
        assert_eq!(count.get(), 5);
    }

    #[test]
    fn target_defaults_to_emitter_unless_given() {
        let events = Events::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        events.on("event", move |e: &Event| s.borrow_mut().push(e.target().cloned()));

        events.emit("event");
        let custom = Value::from("custom");
        events.emit(Event::new("event").with_target(custom.clone()));

        let seen = seen.borrow();
        assert_eq!(seen[0], Some(Target::Hub(events.clone())));
        assert_eq!(seen[1], Some(Target::Value(custom)));
    }

    #[test]
    fn payload_fields_reach_listeners() {
        let events = Events::new();
        let got = Rc::new(RefCell::new(None));
        let g = got.clone();
        events.on("event", move |e: &Event| *g.borrow_mut() = e.field("a").cloned());
        events.emit(Event::new("event").with_field("a", 1));
        assert_eq!(*got.borrow(), Some(Value::from(1)));
    }

    #[test]
    fn several_channels_at_once() {
        let events = Events::new();
        let (count, inc) = counter();
        events.on("a b  c", inc);
        events.emit("a").emit("b").emit("c").emit("d");
        assert_eq!(count.get(), 3);

        events.off("a c");
        events.emit("a").emit("b").emit("c");
        assert_eq!(count.get(), 4);
    }

    #[test]
    fn blank_channels_are_ignored() {
        let events = Events::new();
        let (count, inc) = counter();
        events.on("", inc.clone()).on("   ", inc.clone());
        assert!(events.is_empty());

        events.on("all", inc);
        events.emit("").emit("   ").emit("a b");
        assert_eq!(count.get(), 0);

        events.emit("a");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn observers_outlive_stop_and_off_all() {
        let events = Events::new();
        let (count, inc) = counter();
        let observer = Listener::new(inc);
        events.observe(observer.clone());
        events.on("all", |_: &Event| false);
        events.on("a", |_: &Event| false);

        events.emit("a");
        assert_eq!(count.get(), 1);

        events.off_all().emit("b");
        assert_eq!(count.get(), 2);
        assert!(events.is_empty());
        assert!(events.has_observers());

        events.unobserve(&observer);
        events.emit("c");
        assert_eq!(count.get(), 2);
        assert!(!events.has_observers());
    }

    #[test]
    fn wildcard_runs_after_channel_listeners() {
        let events = Events::new();
        let order = log();
        let (o1, o2) = (order.clone(), order.clone());
        events.on("all", move |e: &Event| o1.borrow_mut().push(format!("all:{}", e.channel())));
        events.on("a", move |_: &Event| o2.borrow_mut().push("a".into()));
        events.emit("a").emit("b");
        assert_eq!(*order.borrow(), ["a", "all:a", "all:b"]);
    }

    #[test]
    fn emitting_all_does_not_double_fire() {
        let events = Events::new();
        let (count, inc) = counter();
        events.on("all", inc);
        events.emit("all");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn off_listener_removes_only_that_listener() {
        let events = Events::new();
        let (a_count, a) = counter();
        let (b_count, b) = counter();
        let a = Listener::new(a);
        events.add_listener("event", &a).on("event", b);
        events.emit("event");
        events.off_listener("event", &a);
        events.emit("event");
        assert_eq!(a_count.get(), 1);
        assert_eq!(b_count.get(), 2);
    }

    #[test]
    fn removing_unknown_listener_is_a_noop() {
        let events = Events::new();
        let (count, inc) = counter();
        events.on("event", inc);
        events.off_listener("event", &Listener::new(|_| ()));
        events.off_listener("missing", &Listener::new(|_| ()));
        events.off("missing");
        events.emit("event");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn off_channel_then_emit_fires_nothing() {
        let events = Events::new();
        let (count, inc) = counter();
        events.on("event", inc.clone()).on("event", inc);
        events.off("event");
        events.emit("event");
        assert_eq!(count.get(), 0);
        assert!(!events.has_listeners("event"));
        assert!(events.is_empty());
    }

    #[test]
    fn off_all_clears_everything() {
        let events = Events::new();
        let (count, inc) = counter();
        events.on("a", inc.clone()).on("b", inc.clone()).on("all", inc);
        events.off_all();
        events.emit("a").emit("b");
        assert_eq!(count.get(), 0);
        assert!(events.is_empty());
    }

    #[test]
    fn bound_context_narrows_removal() {
        let events = Events::new();
        let (count, inc) = counter();
        let listener = Listener::new(inc);
        let (first, second) = (Value::from("first"), Value::from("second"));
        events
            .add_bound_listener("event", &listener, first.clone())
            .add_bound_listener("event", &listener, second);
        assert_eq!(events.listener_count("event"), 2);

        events.off_bound("event", &listener, &first);
        assert_eq!(events.listener_count("event"), 1);
        events.emit("event");
        assert_eq!(count.get(), 1);

        events.off_listener("event", &listener);
        assert!(!events.has_listeners("event"));
    }

    #[test]
    fn duplicate_registrations_fire_twice() {
        let events = Events::new();
        let (count, inc) = counter();
        let listener = Listener::new(inc);
        events.add_listener("event", &listener).add_listener("event", &listener);
        events.emit("event");
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn returning_false_stops_the_current_pass() {
        let events = Events::new();
        let order = log();
        let (o1, o2, o3) = (order.clone(), order.clone(), order.clone());
        events
            .on("x", move |_: &Event| {
                o1.borrow_mut().push("f".to_string());
                false
            })
            .on("x", move |_: &Event| o2.borrow_mut().push("g".to_string()))
            .on("all", move |_: &Event| o3.borrow_mut().push("all".to_string()));
        events.emit("x");
        assert_eq!(*order.borrow(), ["f", "all"]);
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let events = Events::new();
        let order = log();
        let (o1, o2) = (order.clone(), order.clone());
        events
            .on("x", move |_: &Event| o1.borrow_mut().push("f".to_string()))
            .on("x", move |_: &Event| o2.borrow_mut().push("g".to_string()));
        events.emit("x");
        assert_eq!(*order.borrow(), ["f", "g"]);
    }

    #[test]
    fn removal_during_dispatch_does_not_affect_current_pass() {
        let events = Events::new();
        let (count, inc) = counter();
        let later = Listener::new(inc);
        let hub = events.clone();
        let victim = later.clone();
        events.on("event", move |_: &Event| {
            hub.off_listener("event", &victim);
        });
        events.add_listener("event", &later);

        events.emit("event");
        assert_eq!(count.get(), 1);
        events.emit("event");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn registration_during_dispatch_waits_for_next_emit() {
        let events = Events::new();
        let (count, inc) = counter();
        let hub = events.clone();
        events.once("event", move |_: &Event| {
            hub.on("event", inc.clone());
        });

        events.emit("event");
        assert_eq!(count.get(), 0);
        events.emit("event");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn once_fires_a_single_time() {
        let events = Events::new();
        let (count, inc) = counter();
        events.once("event", inc);
        events.emit("event").emit("event");
        assert_eq!(count.get(), 1);
        assert!(events.is_empty());
    }

    #[test]
    fn once_on_several_channels_detaches_from_all() {
        let events = Events::new();
        let (count, inc) = counter();
        events.once("a b", inc);
        events.emit("a").emit("b");
        assert_eq!(count.get(), 1);
        assert!(events.is_empty());
    }

    #[test]
    fn once_can_be_removed_with_the_original_listener() {
        let events = Events::new();
        let (count, inc) = counter();
        let listener = Listener::new(inc);
        events.once_listener("event", &listener);
        events.off_listener("event", &listener);
        events.emit("event");
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn once_survives_recursive_emit() {
        let events = Events::new();
        let (count, inc) = counter();
        let hub = events.clone();
        events.once("event", move |e: &Event| {
            inc(e);
            hub.emit("event");
        });
        events.emit("event");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn emit_within_a_listener() {
        let events = Events::new();
        let order = log();
        let (o1, o2) = (order.clone(), order.clone());
        let hub = events.clone();
        events.on("outer", move |_: &Event| {
            o1.borrow_mut().push("outer".to_string());
            hub.emit("inner");
        });
        events.on("inner", move |_: &Event| o2.borrow_mut().push("inner".to_string()));
        events.emit("outer");
        assert_eq!(*order.borrow(), ["outer", "inner"]);
    }

    #[test]
    fn failing_listener_becomes_error_event() {
        let events = Events::new();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let (after, inc) = counter();
        let e = errors.clone();
        events
            .on("event", |_: &Event| -> Result { Err(Error::new("broken")) })
            .on("event", |_: &Event| -> () { panic!("worse") })
            .on("event", inc)
            .on("error", move |event: &Event| {
                e.borrow_mut().push((event.error().cloned(), event.target().cloned()));
            });

        let custom = Value::from("target");
        events.emit(Event::new("event").with_target(custom.clone()));

        assert_eq!(after.get(), 1);
        let errors = errors.borrow();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].0, Some(Error::new("broken")));
        assert_eq!(errors[1].0, Some(Error::Panic("worse".into())));
        assert_eq!(errors[0].1, Some(Target::Value(custom)));
    }

    #[test]
    fn failing_error_listener_is_swallowed() {
        let events = Events::new();
        let (count, inc) = counter();
        events
            .on("error", |_: &Event| -> Result { Err(Error::new("again")) })
            .on("error", inc);
        events.emit("error");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn failing_wildcard_listener_reports_once() {
        let events = Events::new();
        let (count, inc) = counter();
        events
            .on("all", |e: &Event| -> Result {
                if *e.channel() == Channel::ERROR {
                    Err(Error::new("still broken"))
                } else {
                    Err(Error::new("broken"))
                }
            })
            .on("error", inc);
        events.emit("event");
        assert_eq!(count.get(), 1);
    }
}
