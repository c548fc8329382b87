use std::{process::ExitCode, rc::Rc, time::Duration};

use proving::{
    reporters::{self, Console, Tracer},
    *,
};
use tokio::{sync::oneshot, task::LocalSet};

fn event_tests(suite: &Suite) {
    suite
        .add_test("Events#on", |t| {
            let events = Events::new();
            let hits = Rc::new(std::cell::Cell::new(0));
            let h = hits.clone();
            events.on("ping pong", move |_: &Event| h.set(h.get() + 1));
            events.emit("ping").emit("pong").emit("other");
            t.equal(hits.get(), 2, "listener bound to two channels");
            t.done(1);
            Ok(())
        })
        .add_test("Events#once", |t| {
            let events = Events::new();
            let hits = Rc::new(std::cell::Cell::new(0));
            let h = hits.clone();
            events.once("ping", move |_: &Event| h.set(h.get() + 1));
            events.emit("ping").emit("ping");
            t.equal(hits.get(), 1, "fires a single time");
            t.ok(!events.has_listeners("ping"), "unregistered");
            t.done(2);
            Ok(())
        })
        .add_test("Events#off", |t| {
            let events = Events::new();
            events.on("a b", |_: &Event| ()).off("a");
            t.ok(events.has_listeners("b"), "other channel kept");
            t.not_ok(events.has_listeners("a"), "channel cleared");
            t.done(2);
            Ok(())
        });
}

fn equality_tests(suite: &Suite) {
    suite
        .add_test("deepEqual", |t| {
            let cyclic = seq![1];
            if let Some(items) = cyclic.as_sequence() {
                items.push(cyclic.clone());
            }
            t.deep_equal(seq![1, map! {"a" => "b"}], seq![1, map! {"a" => "b"}], ());
            t.not_deep_equal(0.0, -0.0, "signed zeros differ");
            t.deep_equal(f64::NAN, f64::NAN, "NaN equals itself");
            t.ok(deep_equal(&cyclic, &cyclic), "cycles terminate");
            t.done(4);
            Ok(())
        })
        .add_test("error", |t| {
            let pattern = Pattern::new("^TypeError", "")?;
            t.error(|| Err::<(), _>(Error::type_error("bad")), pattern, ());
            t.no_error(|| Ok(42), ());
            t.done(2);
            Ok(())
        });
}

fn async_tests(suite: &Suite) {
    suite.add_test("deferred done", |t| {
        let t = t.clone();
        tokio::task::spawn_local(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            t.ok(true, "resumed after a delay");
            t.done(1);
        });
        Ok(())
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Config::default()
        .with_scheduling(Scheduling::Local)
        .with_test_timeout(Duration::from_secs(1));
    let suite = Suite::with_config("proving self-check", config);
    event_tests(&suite);
    equality_tests(&suite);
    async_tests(&suite);

    reporters::attach(&suite, Rc::new(Console::stdout()));
    reporters::attach(&suite, Rc::new(Tracer));

    let (tx, rx) = oneshot::channel();
    let tx = std::cell::RefCell::new(Some(tx));
    suite.once("complete", move |_: &Event| {
        if let Some(tx) = tx.borrow_mut().take() {
            let _ = tx.send(());
        }
    });

    LocalSet::new()
        .run_until(async {
            suite.run();
            let _ = rx.await;
        })
        .await;

    if suite.failures() + suite.errors() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
