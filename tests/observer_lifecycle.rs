// tests/observer_lifecycle.rs
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use notification_observers::diagnostics::CollectingSink;
use notification_observers::event::Content;
use notification_observers::record::MailMessage;
use notification_observers::sources::mail::{MailConnector, MailSession};
use notification_observers::sources::MailObserver;
use notification_observers::{
    observe_all, observe_once, run_cycle, with_connection, ConnectionState, ErrorKind, Event,
    EventStream, Observer, ObserverError, SourceType,
};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy)]
enum Step {
    Emit(&'static str),
    Fail,
    Panic,
}

/// Observer driven by a fixed script; counts lifecycle calls.
struct Scripted {
    name: &'static str,
    steps: Vec<Step>,
    refuse_connect: bool,
    connected: bool,
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
}

impl Scripted {
    fn new(name: &'static str, steps: Vec<Step>) -> Self {
        Self {
            name,
            steps,
            refuse_connect: false,
            connected: false,
            connects: Arc::default(),
            disconnects: Arc::default(),
        }
    }

    fn refusing(mut self) -> Self {
        self.refuse_connect = true;
        self
    }
}

#[async_trait]
impl Observer for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Chat
    }

    fn state(&self) -> ConnectionState {
        if self.connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    async fn connect(&mut self) -> Result<(), ObserverError> {
        if self.connected {
            return Err(ObserverError::InvalidState("already connected"));
        }
        if self.refuse_connect {
            return Err(ObserverError::connection(self.name, "refused"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connected = true;
        Ok(())
    }

    fn observe(&mut self) -> Result<EventStream<'_>, ObserverError> {
        if !self.connected {
            return Err(ObserverError::InvalidState("not connected"));
        }
        let items = self.steps.clone().into_iter().map(|s| match s {
            Step::Emit(id) => Ok(Event::new(id, SourceType::Chat, Content::new())),
            Step::Fail => Err(ObserverError::Fetch("provider went away".into())),
            Step::Panic => panic!("adapter bug"),
        });
        Ok(futures::stream::iter(items).boxed())
    }

    async fn disconnect(&mut self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
    }
}

#[tokio::test]
async fn observe_failure_still_disconnects_exactly_once() {
    let sink = CollectingSink::new();
    let mut obs = Scripted::new("chat", vec![Step::Emit("a"), Step::Fail, Step::Emit("b")]);
    let disconnects = obs.disconnects.clone();

    let outcome = run_cycle(&mut obs, &sink).await;

    let ids: Vec<&str> = outcome.events.iter().map(Event::id).collect();
    assert_eq!(ids, vec!["a"]);
    assert_eq!(outcome.failure.as_ref().map(ObserverError::kind), Some(ErrorKind::Fetch));
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(obs.state(), ConnectionState::Disconnected);
    assert_eq!(sink.count(ErrorKind::Fetch), 1);
}

#[tokio::test]
async fn panic_in_body_disconnects_then_resumes() {
    let mut obs = Scripted::new("chat", vec![]);
    let disconnects = obs.disconnects.clone();

    let cycle = with_connection(&mut obs, |_o| async { panic!("body blew up") }.boxed());
    let res: std::thread::Result<Result<(), ObserverError>> =
        AssertUnwindSafe(cycle).catch_unwind().await;

    assert!(res.is_err());
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_connect_is_not_paired_with_disconnect() {
    let sink = CollectingSink::new();
    let mut obs = Scripted::new("gmail", vec![Step::Emit("x")]).refusing();
    let disconnects = obs.disconnects.clone();

    let events = observe_once(&mut obs, &sink).await;

    assert!(events.is_empty());
    assert_eq!(disconnects.load(Ordering::SeqCst), 0);
    assert_eq!(sink.count(ErrorKind::Connection), 1);
}

#[tokio::test]
async fn body_result_is_returned() {
    let mut obs = Scripted::new("chat", vec![Step::Emit("1"), Step::Emit("2")]);
    let n = with_connection(&mut obs, |o| {
        async move {
            match o.observe() {
                Ok(s) => s.count().await,
                Err(_) => 0,
            }
        }
        .boxed()
    })
    .await
    .unwrap();
    assert_eq!(n, 2);
    assert_eq!(obs.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn aggregation_isolates_failing_sources() {
    let sink = CollectingSink::new();
    let mut observers: Vec<Box<dyn Observer>> = vec![
        Box::new(Scripted::new("gmail", vec![Step::Emit("m1"), Step::Emit("m2")])),
        Box::new(Scripted::new("github", vec![Step::Emit("n1")]).refusing()),
        Box::new(Scripted::new("slack", vec![Step::Emit("s1"), Step::Fail])),
    ];

    let merged = observe_all(&mut observers, &sink).await;

    let keys: Vec<&str> = merged.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["github", "gmail", "slack"]);
    assert_eq!(merged["gmail"].len(), 2);
    assert!(merged["github"].is_empty());
    assert_eq!(merged["slack"].len(), 1);
    assert_eq!(sink.count(ErrorKind::Connection), 1);
    assert_eq!(sink.count(ErrorKind::Fetch), 1);
    assert!(observers
        .iter()
        .all(|o| o.state() == ConnectionState::Disconnected));
}

#[tokio::test]
async fn total_failure_yields_empty_lists() {
    let sink = CollectingSink::new();
    let mut observers: Vec<Box<dyn Observer>> = vec![
        Box::new(Scripted::new("gmail", vec![]).refusing()),
        Box::new(Scripted::new("slack", vec![Step::Fail])),
    ];

    let merged = observe_all(&mut observers, &sink).await;

    assert_eq!(merged.len(), 2);
    assert!(merged.values().all(Vec::is_empty));
}

#[tokio::test]
async fn panicking_adapter_does_not_take_down_its_siblings() {
    let sink = CollectingSink::new();
    let panicking = Scripted::new("slack", vec![Step::Emit("s1"), Step::Panic]);
    let disconnects = panicking.disconnects.clone();
    let mut observers: Vec<Box<dyn Observer>> = vec![
        Box::new(Scripted::new("gmail", vec![Step::Emit("m1"), Step::Emit("m2")])),
        Box::new(panicking),
    ];

    let merged = observe_all(&mut observers, &sink).await;

    assert_eq!(merged["gmail"].len(), 2);
    assert!(merged["slack"].is_empty());
    assert_eq!(sink.count(ErrorKind::Panic), 1);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

/// Mail provider whose listing call never answers.
struct Unresponsive;

struct UnresponsiveSession;

#[async_trait]
impl MailConnector for Unresponsive {
    async fn connect(&self) -> Result<Box<dyn MailSession>, ObserverError> {
        Ok(Box::new(UnresponsiveSession))
    }
}

#[async_trait]
impl MailSession for UnresponsiveSession {
    async fn list_unread(&mut self) -> Result<Vec<String>, ObserverError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
    async fn fetch_message(&mut self, id: &str) -> Result<MailMessage, ObserverError> {
        Err(ObserverError::Fetch(format!("unexpected fetch of {id}")))
    }
    async fn remove_label(&mut self, _id: &str, _label: &str) -> Result<(), ObserverError> {
        Ok(())
    }
}

#[tokio::test]
async fn timed_out_source_is_empty_while_siblings_report() {
    let sink = Arc::new(CollectingSink::new());
    let hanging = MailObserver::new(Box::new(Unresponsive), sink.clone())
        .with_call_timeout(Duration::from_millis(50));
    let mut observers: Vec<Box<dyn Observer>> = vec![
        Box::new(hanging),
        Box::new(Scripted::new("slack", vec![Step::Emit("s1")])),
    ];

    let merged = tokio::time::timeout(
        Duration::from_secs(5),
        observe_all(&mut observers, &*sink),
    )
    .await
    .expect("the call bound should cut the hanging source short");

    assert!(merged["gmail"].is_empty());
    assert_eq!(merged["slack"].len(), 1);
    assert_eq!(sink.count(ErrorKind::Timeout), 1);
    assert!(observers
        .iter()
        .all(|o| o.state() == ConnectionState::Disconnected));
}
