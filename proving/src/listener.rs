use std::{
    fmt,
    rc::{Rc, Weak},
};

use crate::{Event, Result, error::capture};

/// What a listener wants the dispatcher to do next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Flow {
    #[default]
    Continue,
    /// Skip the remaining listeners of the current registry pass.
    Stop,
}

/// Return types accepted from listener closures.
///
/// `()` continues, `false` stops, and a `Result` reports a failure that the
/// hub turns into an `error` event.
pub trait IntoFlow {
    fn into_flow(self) -> Result<Flow>;
}

impl IntoFlow for () {
    fn into_flow(self) -> Result<Flow> {
        Ok(Flow::Continue)
    }
}

impl IntoFlow for bool {
    fn into_flow(self) -> Result<Flow> {
        Ok(if self { Flow::Continue } else { Flow::Stop })
    }
}

impl IntoFlow for Flow {
    fn into_flow(self) -> Result<Flow> {
        Ok(self)
    }
}

impl<T: IntoFlow> IntoFlow for Result<T> {
    fn into_flow(self) -> Result<Flow> {
        self.and_then(IntoFlow::into_flow)
    }
}

type Callback = Box<dyn Fn(&Event) -> Result<Flow>>;

struct ListenerInner {
    callback: Callback,
    /// For one-shot wrappers, the listener they forward to.
    original: Option<Listener>,
}

/// A reusable handle to an event callback.
///
/// Handles compare by identity: keep a clone around to remove the listener
/// later with [`Emitter::off_listener`](crate::Emitter::off_listener).
///
/// ```rust
/// use proving::{Emitter, Events, Listener};
///
/// let events = Events::new();
/// let listener = Listener::new(|event| println!("{}", event.channel()));
/// events.add_listener("ping", &listener);
/// events.emit("ping");
/// events.off_listener("ping", &listener);
/// ```
#[derive(Clone)]
pub struct Listener(Rc<ListenerInner>);

impl Listener {
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(&Event) -> R + 'static,
        R: IntoFlow,
    {
        Self(Rc::new(ListenerInner {
            callback: Box::new(move |event: &Event| f(event).into_flow()),
            original: None,
        }))
    }

    /// Wraps `original` so that `detach` runs with the wrapper itself before
    /// the first forwarded call.
    pub(crate) fn once(original: Listener, detach: impl Fn(&Listener) + 'static) -> Self {
        Self(Rc::new_cyclic(|me: &Weak<ListenerInner>| {
            let me = me.clone();
            let forward = original.clone();
            ListenerInner {
                callback: Box::new(move |event: &Event| {
                    if let Some(me) = me.upgrade() {
                        detach(&Listener(me));
                    }
                    forward.invoke(event)
                }),
                original: Some(original),
            }
        }))
    }

    /// Calls the listener, turning a panic into an error.
    pub(crate) fn invoke(&self, event: &Event) -> Result<Flow> {
        capture(|| (self.0.callback)(event))
    }

    pub fn ptr_eq(&self, other: &Listener) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity match that also sees through one-shot wrappers.
    pub(crate) fn matches(&self, other: &Listener) -> bool {
        self.ptr_eq(other)
            || self
                .0
                .original
                .as_ref()
                .is_some_and(|original| original.matches(other))
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("ptr", &Rc::as_ptr(&self.0))
            .field("once", &self.0.original.is_some())
            .finish()
    }
}
