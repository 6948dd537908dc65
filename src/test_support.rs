//! In-memory stand-ins for the browser, used by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::{self, FutureExt, LocalBoxFuture};
use futures::task::LocalSpawnExt;
use serde_json::Value;

use crate::coordinator::PopupWindow;
use crate::detector::AppSwitchDetector;
use crate::logger::MemorySink;
use crate::messenger::{MessengerError, Reply, Transport};
use crate::popup::{PopupEnv, RelatedApps, Runtime};
use crate::session::{Env, FundingSource, Locale, RelatedApp, SessionContext};
use crate::subscription::Subscription;

pub fn session() -> SessionContext {
    SessionContext {
        parent_domain: "foo.paypal.com".into(),
        env: Env::Test,
        session_id: "session-1".into(),
        button_session_id: "button-1".into(),
        sdk_correlation_id: "corr-1".into(),
        client_id: "client-1".into(),
        funding_source: FundingSource::Venmo,
        locale: Locale {
            lang: "en".into(),
            country: "US".into(),
        },
        buyer_country: "US".into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub event: String,
    pub payload: Value,
    pub domain: String,
}

enum Script {
    Reply(Value),
    Fail(MessengerError),
    Hold,
}

type ReplySender = oneshot::Sender<Result<Reply, MessengerError>>;

/// Transport that records every message and answers from a script.
/// Unscripted events are acknowledged with `null`.
#[derive(Default)]
pub struct ScriptedTransport {
    sent: RefCell<Vec<SentMessage>>,
    scripts: RefCell<HashMap<String, Script>>,
    held: RefCell<Vec<(String, ReplySender)>>,
}

impl ScriptedTransport {
    pub fn reply_with(&self, event: &str, data: Value) {
        self.scripts
            .borrow_mut()
            .insert(event.to_string(), Script::Reply(data));
    }

    pub fn fail_with(&self, event: &str, err: MessengerError) {
        self.scripts
            .borrow_mut()
            .insert(event.to_string(), Script::Fail(err));
    }

    /// Leave replies to `event` pending until `release`.
    pub fn hold(&self, event: &str) {
        self.scripts
            .borrow_mut()
            .insert(event.to_string(), Script::Hold);
    }

    pub fn release(&self, event: &str, result: Result<Value, MessengerError>) {
        let position = self
            .held
            .borrow()
            .iter()
            .position(|(held, _)| held == event);
        if let Some(position) = position {
            let (_, sender) = self.held.borrow_mut().remove(position);
            let _ = sender.send(result.map(ack));
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.borrow().clone()
    }

    pub fn sent_for(&self, event: &str) -> Vec<SentMessage> {
        self.sent
            .borrow()
            .iter()
            .filter(|message| message.event == event)
            .cloned()
            .collect()
    }

    pub fn events(&self) -> Vec<String> {
        self.sent
            .borrow()
            .iter()
            .map(|message| message.event.clone())
            .collect()
    }
}

fn ack(data: Value) -> Reply {
    Reply {
        origin: "https://popup.example".into(),
        data,
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        event: &str,
        payload: Value,
        domain: &str,
    ) -> LocalBoxFuture<'static, Result<Reply, MessengerError>> {
        self.sent.borrow_mut().push(SentMessage {
            event: event.to_string(),
            payload,
            domain: domain.to_string(),
        });

        let result = match self.scripts.borrow().get(event) {
            Some(Script::Reply(data)) => Ok(ack(data.clone())),
            Some(Script::Fail(err)) => Err(err.clone()),
            Some(Script::Hold) => {
                let (sender, receiver) = oneshot::channel();
                self.held.borrow_mut().push((event.to_string(), sender));
                return async move {
                    receiver
                        .await
                        .unwrap_or(Err(MessengerError::TargetClosed))
                }
                .boxed_local();
            }
            None => Ok(ack(Value::Null)),
        };
        future::ready(result).boxed_local()
    }
}

type FragmentListeners = Rc<RefCell<Vec<(u64, Rc<RefCell<Box<dyn FnMut(String)>>>)>>>;
type CloseListeners = Rc<RefCell<Vec<(u64, Box<dyn FnOnce()>)>>>;

/// Popup window whose fragment is changed by the test.
pub struct FakeWindow {
    href: RefCell<String>,
    navigations: RefCell<Vec<String>>,
    close_calls: Cell<usize>,
    fail_navigation: Cell<bool>,
    next_id: Cell<u64>,
    fragment_listeners: FragmentListeners,
    close_listeners: CloseListeners,
}

impl FakeWindow {
    pub fn new(href: &str) -> Self {
        FakeWindow {
            href: RefCell::new(href.to_string()),
            navigations: RefCell::new(Vec::new()),
            close_calls: Cell::new(0),
            fail_navigation: Cell::new(false),
            next_id: Cell::new(0),
            fragment_listeners: Rc::new(RefCell::new(Vec::new())),
            close_listeners: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Set `location.hash` and fire `hashchange`.
    pub fn set_hash(&self, fragment: &str) {
        let base = self
            .href
            .borrow()
            .split('#')
            .next()
            .unwrap_or_default()
            .to_string();
        *self.href.borrow_mut() = format!("{}#{}", base, fragment);

        let listeners: Vec<_> = self
            .fragment_listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            (listener.borrow_mut())(fragment.to_string());
        }
    }

    /// The user closes the popup.
    pub fn user_close(&self) {
        let listeners = std::mem::take(&mut *self.close_listeners.borrow_mut());
        for (_, listener) in listeners {
            listener();
        }
    }

    pub fn fail_navigation(&self) {
        self.fail_navigation.set(true);
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.borrow().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.get()
    }

    pub fn listener_count(&self) -> usize {
        self.fragment_listeners.borrow().len() + self.close_listeners.borrow().len()
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

impl PopupWindow for FakeWindow {
    fn page_url(&self) -> String {
        self.href.borrow().clone()
    }

    fn navigate(&self, url: &str) -> Result<(), String> {
        if self.fail_navigation.get() {
            return Err("navigation blocked".into());
        }
        self.navigations.borrow_mut().push(url.to_string());
        Ok(())
    }

    fn close(&self) {
        self.close_calls.set(self.close_calls.get() + 1);
    }

    fn on_fragment_change(&self, callback: Box<dyn FnMut(String)>) -> Subscription {
        let id = self.next_id();
        self.fragment_listeners
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(callback))));
        let listeners = self.fragment_listeners.clone();
        Subscription::new(move || listeners.borrow_mut().retain(|(other, _)| *other != id))
    }

    fn on_closed(&self, callback: Box<dyn FnOnce()>) -> Subscription {
        let id = self.next_id();
        self.close_listeners.borrow_mut().push((id, callback));
        let listeners = self.close_listeners.clone();
        Subscription::new(move || listeners.borrow_mut().retain(|(other, _)| *other != id))
    }
}

/// Detector fired by hand.
#[derive(Default)]
pub struct FakeDetector {
    next_id: Cell<u64>,
    watchers: Rc<RefCell<Vec<(u64, Box<dyn FnOnce()>)>>>,
}

impl FakeDetector {
    pub fn trigger(&self) {
        let watchers = std::mem::take(&mut *self.watchers.borrow_mut());
        for (_, on_switch) in watchers {
            on_switch();
        }
    }

    pub fn active(&self) -> usize {
        self.watchers.borrow().len()
    }
}

impl AppSwitchDetector for FakeDetector {
    fn watch(&self, on_switch: Box<dyn FnOnce()>) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.watchers.borrow_mut().push((id, on_switch));
        let watchers = self.watchers.clone();
        Subscription::new(move || watchers.borrow_mut().retain(|(other, _)| *other != id))
    }
}

/// Runtime backed by a `LocalPool`; timers only fire on `elapse_all`.
pub struct PoolRuntime {
    spawner: LocalSpawner,
    timers: RefCell<Vec<oneshot::Sender<()>>>,
}

impl PoolRuntime {
    pub fn elapse_all(&self) {
        for timer in self.timers.borrow_mut().drain(..) {
            let _ = timer.send(());
        }
    }
}

impl Runtime for PoolRuntime {
    fn spawn(&self, future: LocalBoxFuture<'static, ()>) {
        self.spawner
            .spawn_local(future)
            .expect("local pool is gone");
    }

    fn sleep(&self, _duration: Duration) -> LocalBoxFuture<'static, ()> {
        let (sender, receiver) = oneshot::channel();
        self.timers.borrow_mut().push(sender);
        receiver.map(|_| ()).boxed_local()
    }
}

pub struct FixedRelatedApps {
    apps: Option<Vec<RelatedApp>>,
}

impl FixedRelatedApps {
    pub fn new(apps: Vec<RelatedApp>) -> Self {
        FixedRelatedApps { apps: Some(apps) }
    }

    /// A query that never answers.
    pub fn pending() -> Self {
        FixedRelatedApps { apps: None }
    }
}

impl RelatedApps for FixedRelatedApps {
    fn installed_related_apps(&self) -> LocalBoxFuture<'static, Result<Vec<RelatedApp>, String>> {
        match &self.apps {
            Some(apps) => future::ready(Ok(apps.clone())).boxed_local(),
            None => future::pending().boxed_local(),
        }
    }
}

pub struct Harness {
    pub pool: LocalPool,
    pub transport: Rc<ScriptedTransport>,
    pub window: Rc<FakeWindow>,
    pub detector: Rc<FakeDetector>,
    pub runtime: Rc<PoolRuntime>,
    pub sink: Rc<MemorySink>,
}

impl Harness {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let runtime = Rc::new(PoolRuntime {
            spawner: pool.spawner(),
            timers: RefCell::new(Vec::new()),
        });
        Harness {
            pool,
            transport: Rc::new(ScriptedTransport::default()),
            window: Rc::new(FakeWindow::new("https://popup.example/native")),
            detector: Rc::new(FakeDetector::default()),
            runtime,
            sink: Rc::new(MemorySink::default()),
        }
    }

    pub fn env(&self) -> PopupEnv {
        PopupEnv {
            transport: self.transport.clone(),
            window: self.window.clone(),
            detector: self.detector.clone(),
            related_apps: None,
            runtime: self.runtime.clone(),
            log_sink: self.sink.clone(),
            clock: || 0.0,
        }
    }

    pub fn run(&mut self) {
        self.pool.run_until_stalled();
    }
}
