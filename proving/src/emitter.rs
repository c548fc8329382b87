use crate::{Event, Events, IntoFlow, Listener, Target, Value};

/// Event registration and emission, shared by [`Events`],
/// [`TestCase`](crate::TestCase) and [`Suite`](crate::Suite).
///
/// Implementors only provide access to their embedded hub and a way to name
/// themselves as an event target; every other method has a default.
///
/// `channels` arguments accept one or more whitespace-separated channel
/// names. A blank string registers or removes nothing.
///
/// # Example
///
/// ```rust
/// use proving::{Emitter, Event, Events};
///
/// let events = Events::new();
/// events
///     .on("greet", |event: &Event| println!("hello from {}", event.channel()))
///     .emit("greet");
/// ```
pub trait Emitter {
    /// The hub holding this emitter's listeners.
    fn events(&self) -> &Events;

    /// How this emitter appears in [`Event::target`].
    fn as_target(&self) -> Target;

    /// Delivers a fully built event to this emitter's listeners.
    ///
    /// Overridden by emitters that observe their own traffic.
    fn emit_event(&self, event: Event) {
        self.events().dispatch(event, self);
    }

    /// Emit an event or a bare channel name.
    fn emit(&self, event: impl Into<Event>) -> &Self
    where
        Self: Sized,
    {
        self.emit_event(event.into());
        self
    }

    /// Register a closure.
    ///
    /// Closures may return `()`, a `bool` (`false` stops the remaining
    /// listeners of the current pass), a [`Flow`](crate::Flow), or a
    /// `Result` of those; an `Err` is reported as an `error` event.
    fn on<F, R>(&self, channels: &str, f: F) -> &Self
    where
        Self: Sized,
        F: Fn(&Event) -> R + 'static,
        R: IntoFlow,
    {
        self.add_listener(channels, &Listener::new(f))
    }

    fn add_listener(&self, channels: &str, listener: &Listener) -> &Self
    where
        Self: Sized,
    {
        self.events().register(channels, listener.clone(), None);
        self
    }

    /// Register `listener` bound to `context`.
    ///
    /// The context is a removal key only; the listener is not given it. The
    /// same listener can be bound several times with different contexts and
    /// later removed selectively with [`Emitter::off_bound`].
    fn add_bound_listener(&self, channels: &str, listener: &Listener, context: Value) -> &Self
    where
        Self: Sized,
    {
        self.events()
            .register(channels, listener.clone(), Some(context));
        self
    }

    /// Register a closure that unregisters itself before its first call.
    fn once<F, R>(&self, channels: &str, f: F) -> &Self
    where
        Self: Sized,
        F: Fn(&Event) -> R + 'static,
        R: IntoFlow,
    {
        self.once_listener(channels, &Listener::new(f))
    }

    fn once_listener(&self, channels: &str, listener: &Listener) -> &Self
    where
        Self: Sized,
    {
        self.events().register_once(channels, listener.clone());
        self
    }

    /// Remove every listener on the given channels.
    fn off(&self, channels: &str) -> &Self
    where
        Self: Sized,
    {
        self.events().remove(channels, None, None);
        self
    }

    /// Remove `listener` from the given channels, including pending
    /// [`Emitter::once`] registrations of it and all of its bound contexts.
    fn off_listener(&self, channels: &str, listener: &Listener) -> &Self
    where
        Self: Sized,
    {
        self.events().remove(channels, Some(listener), None);
        self
    }

    /// Remove `listener` only where it was bound to a context strictly equal
    /// to `context`.
    fn off_bound(&self, channels: &str, listener: &Listener, context: &Value) -> &Self
    where
        Self: Sized,
    {
        self.events().remove(channels, Some(listener), Some(context));
        self
    }

    /// Remove every listener on every channel.
    fn off_all(&self) -> &Self
    where
        Self: Sized,
    {
        self.events().clear();
        self
    }
}
