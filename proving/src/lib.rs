#![cfg_attr(docsrs, feature(doc_cfg))]
//! # Proving
//!
//! An event-driven unit-testing micro-library.
//!
//! Tests are bodies that receive a [`TestCase`], record assertions against it,
//! and signal completion with [`TestCase::done`]. Every step is published as an
//! event: suites, tests and plain [`Events`] hubs share one [`Emitter`]
//! interface, so reporting is a matter of attaching listeners. A [`Suite`]
//! runs its tests strictly one after another, even when bodies finish
//! asynchronously, and re-emits everything they produce.
//!
//! ## Quick Start
//!
//! ```rust
//! use proving::*;
//!
//! let suite = Suite::new("arithmetic");
//! suite
//!     .add_test("sums", |t| {
//!         t.equal(2 + 2, 4, "two plus two");
//!         t.deep_equal(seq![1, 2], seq![1, 2], ());
//!         t.done(2);
//!         Ok(())
//!     })
//!     .add_test("errors", |t| {
//!         t.error(|| Err::<(), _>(Error::type_error("bad input")), (), ());
//!         t.done(());
//!         Ok(())
//!     });
//!
//! suite.on("failure", |event: &Event| {
//!     eprintln!("{}: {:?}", event.channel(), event.message());
//! });
//! suite.run();
//! assert_eq!(suite.failures(), 0);
//! ```
//!
//! ## Core Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Value`] | Dynamically typed values compared by assertions |
//! | [`Comparator`] | Recursive structural equality with cycle detection |
//! | [`Events`] | Channel-keyed listener registry |
//! | [`Emitter`] | Registration and emission shared by hubs, tests and suites |
//! | [`TestCase`] | A named test body with assertion counters |
//! | [`Suite`] | An ordered collection of tests, run sequentially |
//! | [`Scheduler`] | Decides when the next test starts |
//! | [`Config`] | Scheduling, equality and timeout settings |
//!
//! ## Channels
//!
//! | Channel | Emitted by | Meaning |
//! |---------|------------|---------|
//! | `start` | suite | before any test runs |
//! | `setup` | test | test about to run its body |
//! | `assertion` | test | assertion passed |
//! | `failure` | test | assertion failed |
//! | `error` | test, suite, hub | a body or a listener failed |
//! | `teardown` | test | test finished |
//! | `complete` | suite | every test finished |
//! | `all` | any | wildcard, receives every event |
//!
//! ## Asynchronous Bodies
//!
//! With [`Scheduling::Local`] tests are spawned on the current
//! `tokio::task::LocalSet`, and a body may hand its [`TestCase`] to another
//! local task that calls `done` later. [`Config::with_test_timeout`] aborts
//! bodies that never finish.
//!
//! ## Features
//!
//! - **`serde`** - `Serialize`/`Deserialize` for [`Config`], [`Channel`] and
//!   [`EventId`], [`Value::to_json`], and JSON Lines output from
//!   [`reporters::Recorder`]
//!
//! ## Examples
//!
//! See the `demos/` directory:
//!
//! - `self_check.rs` - A suite exercising the library, reported on the console

mod assertion;
mod config;
mod emitter;
mod equality;
mod error;
mod event;
mod events;
mod listener;
mod scheduler;
mod suite;
mod test_case;
mod value;

pub mod reporters;

pub use assertion::Expect;
pub use config::{Config, DEFAULT_SUITE_NAME, DEFAULT_TEST_NAME, Scheduling};
pub use emitter::Emitter;
pub use equality::{Comparator, Kind, deep_equal, equals};
pub use error::Error;
pub use event::{Channel, Event, EventId, Target};
pub use events::Events;
pub use listener::{Flow, IntoFlow, Listener};
pub use scheduler::{Immediate, Local, Queued, Scheduler, Task};
pub use suite::{Suite, SuiteBuilder};
pub use test_case::{Message, Phase, Plan, TestBody, TestCase};
pub use value::{Callable, Map, Pattern, Sequence, Temporal, Value};

/// Convenience alias for `Result<T, proving::Error>`.
pub type Result<T = ()> = std::result::Result<T, Error>;

/// The crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build a [`Value::Sequence`] from a list of expressions convertible into
/// [`Value`].
///
/// ```rust
/// use proving::{Value, seq};
///
/// let list = seq![1, "two", true];
/// assert_eq!(list.as_sequence().map(|s| s.len()), Some(3));
/// assert_eq!(seq![].as_sequence().map(|s| s.len()), Some(0));
/// ```
#[macro_export]
macro_rules! seq {
    ($($item:expr),* $(,)?) => {
        $crate::Value::Sequence($crate::Sequence::from_values::<_, $crate::Value>([
            $($crate::Value::from($item)),*
        ]))
    };
}

/// Build a [`Value::Map`] from `key => value` pairs.
///
/// ```rust
/// use proving::{map, seq};
///
/// let person = map! {"name" => "Kit", "hobbies" => seq!["biking"]};
/// assert!(person.as_map().is_some_and(|m| m.contains_key("hobbies")));
/// ```
#[macro_export]
macro_rules! map {
    ($($key:expr => $value:expr),* $(,)?) => {
        $crate::Value::Map($crate::Map::from_entries::<_, ::std::string::String, $crate::Value>([
            $((::std::string::String::from($key), $crate::Value::from($value))),*
        ]))
    };
}
