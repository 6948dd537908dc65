//! The native popup entry point.
//!
//! `setup_native_popup` wires the redirect coordinator to the opener channel,
//! the popup window and the app-switch detector:
//!
//! 1. resolve installed native app metadata (bounded wait),
//! 2. `awaitRedirect` → the opener answers with the URL to navigate to,
//! 3. navigate and watch for the app switch (`detectAppSwitch`, informational),
//! 4. the first recognized fragment becomes the outcome; it is reported to the
//!    opener and the popup is destroyed.
//!
//! All state lives in one [`Machine`] behind `Rc<RefCell<_>>`. Browser
//! callbacks only hold `Weak` references to it and never run while it is
//! borrowed, so a stale callback after `destroy()` finds nothing to do.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, Either, FutureExt, LocalBoxFuture, Shared};
use serde_json::json;
use url::Url;

use crate::config::NativePopupConfig;
use crate::coordinator::{Command, Effect, PopupWindow, RedirectCoordinator, RedirectState};
use crate::detector::{AppSwitchDetector, AppSwitchLatch};
use crate::error::NativePopupError;
use crate::logger::{LogSink, Logger};
use crate::messenger::{AwaitRedirectRequest, OpenerChannel, Transport, DETECT_APP_SWITCH, ON_ERROR};
use crate::outcome::Outcome;
use crate::session::{match_installed_app, InstalledApp, RelatedApp, SessionContext};
use crate::subscription::Subscription;

/// Task spawning and timers of the host event loop.
pub trait Runtime {
    fn spawn(&self, future: LocalBoxFuture<'static, ()>);

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}

/// `navigator.getInstalledRelatedApps()`; absent on most platforms.
pub trait RelatedApps {
    fn installed_related_apps(&self) -> LocalBoxFuture<'static, Result<Vec<RelatedApp>, String>>;
}

/// Capabilities the popup runs against.
#[derive(Clone)]
pub struct PopupEnv {
    pub transport: Rc<dyn Transport>,
    pub window: Rc<dyn PopupWindow>,
    pub detector: Rc<dyn AppSwitchDetector>,
    pub related_apps: Option<Rc<dyn RelatedApps>>,
    pub runtime: Rc<dyn Runtime>,
    pub log_sink: Rc<dyn LogSink>,
    /// Milliseconds since the epoch, for log timestamps.
    pub clock: fn() -> f64,
}

/// What `finished()` resolves to: the reported outcome, `None` when the popup
/// was destroyed before one arrived, or the fatal error.
pub type Finished = Result<Option<Outcome>, NativePopupError>;

struct Machine {
    session: SessionContext,
    config: NativePopupConfig,
    env: PopupEnv,
    channel: OpenerChannel,
    logger: Rc<Logger>,
    coordinator: RedirectCoordinator,
    latch: AppSwitchLatch,
    listeners: Vec<Subscription>,
    reported: Option<Outcome>,
    failure: Option<NativePopupError>,
    done: Option<oneshot::Sender<Finished>>,
}

/// Handle to a running native popup.
#[derive(Clone)]
pub struct NativePopup {
    machine: Rc<RefCell<Machine>>,
    finished: Shared<oneshot::Receiver<Finished>>,
}

/// Start a native popup invocation.
///
/// Fails immediately only for configuration errors (an unusable parent
/// domain); everything later is reported through [`NativePopup::finished`]
/// and [`NativePopup::destroy`].
pub fn setup_native_popup(
    session: SessionContext,
    config: NativePopupConfig,
    env: PopupEnv,
) -> Result<NativePopup, NativePopupError> {
    let channel = OpenerChannel::new(env.transport.clone(), &session.parent_domain)?;
    let referer = referer_of(&env.window.page_url());
    let logger = Rc::new(Logger::for_session(
        &session,
        &referer,
        env.log_sink.clone(),
        env.clock,
    ));

    logger
        .info(
            "native_popup_init",
            json!({ "fundingSource": session.funding_source.as_str() }),
        )
        .track(json!({ "transition_name": "native_popup_init" }))
        .flush();

    let (done, finished) = oneshot::channel();
    let runtime = env.runtime.clone();
    let window = env.window.clone();
    let machine = Rc::new(RefCell::new(Machine {
        session,
        config,
        env,
        channel,
        logger,
        coordinator: RedirectCoordinator::new(),
        latch: AppSwitchLatch::default(),
        listeners: Vec::new(),
        reported: None,
        failure: None,
        done: Some(done),
    }));

    let weak = Rc::downgrade(&machine);
    let closed = window.on_closed(Box::new(move || {
        if let Some(machine) = weak.upgrade() {
            machine
                .borrow()
                .logger
                .info("native_popup_window_closed", json!({}))
                .flush();
            dispatch(&machine, Command::WindowClosed);
        }
    }));
    machine.borrow_mut().listeners.push(closed);

    runtime.spawn(start(machine.clone()).boxed_local());

    Ok(NativePopup {
        machine,
        finished: finished.shared(),
    })
}

impl NativePopup {
    /// Tear the popup down: unregister every listener and close the window.
    ///
    /// Safe to call any number of times; only the first call closes the
    /// window. Returns the fatal error of the invocation, if there was one.
    pub fn destroy(&self) -> Result<(), NativePopupError> {
        dispatch(&self.machine, Command::Destroy);
        match &self.machine.borrow().failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Resolves once the popup has been destroyed.
    pub fn finished(&self) -> LocalBoxFuture<'static, Finished> {
        let finished = self.finished.clone();
        async move { finished.await.unwrap_or(Err(NativePopupError::Abandoned)) }.boxed_local()
    }

    pub fn state(&self) -> RedirectState {
        self.machine.borrow().coordinator.state().clone()
    }

    pub fn app_switched(&self) -> bool {
        self.machine.borrow().latch.has_switched()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.machine.borrow().reported.clone()
    }

    /// The session logger, for events that belong to this invocation.
    pub fn logger(&self) -> Rc<Logger> {
        self.machine.borrow().logger.clone()
    }
}

async fn start(machine: Rc<RefCell<Machine>>) {
    let app = resolve_installed_app(&machine).await;
    let page_url = machine.borrow().env.window.page_url();
    dispatch(&machine, Command::Start { page_url, app });
}

async fn resolve_installed_app(machine: &Rc<RefCell<Machine>>) -> Option<InstalledApp> {
    let (query, timeout, app_ids, logger) = {
        let m = machine.borrow();
        let related_apps = m.env.related_apps.clone()?;
        (
            related_apps.installed_related_apps(),
            m.env.runtime.sleep(m.config.installed_apps_timeout()),
            m.config.app_ids_for(m.session.funding_source).to_vec(),
            m.logger.clone(),
        )
    };

    match future::select(query, timeout).await {
        Either::Left((Ok(related), _)) => {
            let app = match_installed_app(&related, &app_ids);
            logger.info(
                "native_popup_installed_app",
                json!({ "installed": app.installed, "id": app.id, "version": app.version }),
            );
            Some(app)
        }
        Either::Left((Err(err), _)) => {
            logger.info("native_popup_installed_app_error", json!({ "err": err }));
            None
        }
        Either::Right(_) => {
            logger.info("native_popup_installed_app_timeout", json!({}));
            None
        }
    }
}

fn dispatch(machine: &Rc<RefCell<Machine>>, command: Command) {
    let effects = machine.borrow_mut().coordinator.handle(command);
    for effect in effects {
        let teardown = matches!(effect, Effect::ReleaseListeners | Effect::CloseWindow);
        if !teardown && machine.borrow().coordinator.is_destroyed() {
            continue;
        }
        apply(machine, effect);
    }
    settle(machine);
}

fn apply(machine: &Rc<RefCell<Machine>>, effect: Effect) {
    match effect {
        Effect::RequestRedirect(request) => request_redirect(machine, request),
        Effect::Navigate(url) => navigate(machine, url),
        Effect::WatchAppSwitch => watch_app_switch(machine),
        Effect::Report(outcome) => report(machine, outcome),
        Effect::ReleaseListeners => {
            let listeners = std::mem::take(&mut machine.borrow_mut().listeners);
            for listener in listeners {
                listener.cancel();
            }
        }
        Effect::CloseWindow => {
            let window = machine.borrow().env.window.clone();
            window.close();
        }
    }
}

fn request_redirect(machine: &Rc<RefCell<Machine>>, request: AwaitRedirectRequest) {
    let (reply, runtime) = {
        let m = machine.borrow();
        m.logger.info(
            "native_popup_await_redirect",
            json!({ "pageUrl": request.page_url, "app": request.app }),
        );
        (m.channel.await_redirect(&request), m.env.runtime.clone())
    };

    let machine = machine.clone();
    runtime.spawn(
        async move {
            match reply.await {
                Ok(reply) => {
                    let logger = machine.borrow().logger.clone();
                    logger.info(
                        "native_popup_redirect_reply",
                        json!({ "origin": reply.origin }),
                    );
                    dispatch(&machine, Command::RedirectUrl(reply.redirect_url))
                }
                Err(err) => fail(&machine, err.into()),
            }
        }
        .boxed_local(),
    );
}

fn navigate(machine: &Rc<RefCell<Machine>>, url: String) {
    let (window, logger) = {
        let m = machine.borrow();
        (m.env.window.clone(), m.logger.clone())
    };

    // Listen before navigating so a fast return is not missed.
    let weak = Rc::downgrade(machine);
    let fragments = window.on_fragment_change(Box::new(move |fragment| {
        if let Some(machine) = weak.upgrade() {
            let logger = machine.borrow().logger.clone();
            logger.info("native_popup_hashchange", json!({ "hash": fragment }));
            dispatch(&machine, Command::Fragment(fragment));
        }
    }));
    machine.borrow_mut().listeners.push(fragments);

    logger
        .info("native_popup_redirect", json!({ "url": url }))
        .flush();
    if let Err(message) = window.navigate(&url) {
        fail(machine, NativePopupError::navigation(url, message));
    }
}

fn watch_app_switch(machine: &Rc<RefCell<Machine>>) {
    let detector = machine.borrow().env.detector.clone();
    let weak = Rc::downgrade(machine);
    let watch = detector.watch(Box::new(move || {
        if let Some(machine) = weak.upgrade() {
            app_switched(&machine);
        }
    }));
    machine.borrow_mut().listeners.push(watch);
}

fn app_switched(machine: &Rc<RefCell<Machine>>) {
    let (notify, logger, runtime) = {
        let m = machine.borrow();
        if m.coordinator.is_destroyed() || !m.latch.set() {
            return;
        }
        (
            m.channel.send(DETECT_APP_SWITCH, json!({})),
            m.logger.clone(),
            m.env.runtime.clone(),
        )
    };

    logger
        .info("native_popup_app_switch", json!({}))
        .track(json!({ "transition_name": "native_popup_app_switch" }))
        .flush();

    runtime.spawn(
        async move {
            if let Err(err) = notify.await {
                log::warn!(target: "native_popup", "detectAppSwitch not acknowledged: {}", err);
            }
        }
        .boxed_local(),
    );
}

fn report(machine: &Rc<RefCell<Machine>>, outcome: Outcome) {
    let (send, logger, runtime, app_switched) = {
        let mut m = machine.borrow_mut();
        m.reported = Some(outcome.clone());
        (
            m.channel.send(outcome.event_name(), outcome.payload()),
            m.logger.clone(),
            m.env.runtime.clone(),
            m.latch.has_switched(),
        )
    };

    logger
        .info(
            "native_popup_outcome",
            json!({ "outcome": outcome.kind(), "appSwitched": app_switched }),
        )
        .track(json!({
            "transition_name": format!("native_popup_{}", outcome.kind()),
        }))
        .flush();

    let machine = machine.clone();
    runtime.spawn(
        async move {
            if let Err(err) = send.await {
                logger
                    .error(
                        "native_popup_report_error",
                        json!({ "event": outcome.event_name(), "err": err.to_string() }),
                    )
                    .flush();
                let mut m = machine.borrow_mut();
                if m.failure.is_none() {
                    m.failure = Some(err.into());
                }
            }
            dispatch(&machine, Command::Destroy);
        }
        .boxed_local(),
    );
}

/// Fatal error before an outcome was reported: tell the opener (best
/// effort), record the error and tear down.
fn fail(machine: &Rc<RefCell<Machine>>, err: NativePopupError) {
    let (notify, logger, runtime) = {
        let mut m = machine.borrow_mut();
        if m.coordinator.is_destroyed() {
            return;
        }
        if m.failure.is_none() {
            m.failure = Some(err.clone());
        }
        let notify = match m.reported {
            Some(_) => None,
            None => Some(m.channel.send(ON_ERROR, json!({ "message": err.to_string() }))),
        };
        (notify, m.logger.clone(), m.env.runtime.clone())
    };

    logger
        .error("native_popup_error", json!({ "err": err.to_string() }))
        .track(json!({
            "error_code": "native_popup_error",
            "error_desc": err.to_string(),
        }))
        .flush();

    if let Some(notify) = notify {
        runtime.spawn(
            async move {
                let _ = notify.await;
            }
            .boxed_local(),
        );
    }
    dispatch(machine, Command::Destroy);
}

fn settle(machine: &Rc<RefCell<Machine>>) {
    let (done, result, logger) = {
        let mut m = machine.borrow_mut();
        if !m.coordinator.is_destroyed() {
            return;
        }
        let Some(done) = m.done.take() else {
            return;
        };
        let result = match &m.failure {
            Some(err) => Err(err.clone()),
            None => Ok(m.reported.clone()),
        };
        (done, result, m.logger.clone())
    };

    logger
        .info(
            "native_popup_destroy",
            json!({ "outcome": result.as_ref().ok().and_then(Option::as_ref).map(Outcome::kind) }),
        )
        .flush();
    let _ = done.send(result);
}

fn referer_of(page_url: &str) -> String {
    Url::parse(page_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::{MessengerError, AWAIT_REDIRECT};
    use crate::outcome::Approval;
    use crate::test_support::{session, FixedRelatedApps, Harness};
    use crate::session::FundingSource;
    use serde_json::{json, Value};

    fn redirect_to_test(harness: &Harness) {
        harness
            .transport
            .reply_with(AWAIT_REDIRECT, json!({ "redirectUrl": "#test" }));
    }

    fn started(harness: &mut Harness) -> NativePopup {
        redirect_to_test(harness);
        let popup =
            setup_native_popup(session(), NativePopupConfig::default(), harness.env()).unwrap();
        harness.run();
        popup
    }

    #[test]
    fn requests_redirect_then_navigates() {
        let mut harness = Harness::new();
        let popup = started(&mut harness);

        let sent = harness.transport.sent();
        assert_eq!(sent[0].event, AWAIT_REDIRECT);
        assert_eq!(sent[0].domain, "foo.paypal.com");
        assert_eq!(
            sent[0].payload,
            json!({ "pageUrl": "https://popup.example/native#close" })
        );
        assert_eq!(harness.window.navigations(), vec!["#test".to_string()]);
        assert!(matches!(popup.state(), RedirectState::Navigated { .. }));
        assert_eq!(harness.detector.active(), 1);
    }

    #[test]
    fn scenario_a_app_switch_then_approve() {
        let mut harness = Harness::new();
        let popup = started(&mut harness);

        harness.detector.trigger();
        harness.run();
        assert!(popup.app_switched());

        harness
            .window
            .set_hash("onApprove?payerID=YYYYYYYYYY&paymentID=PAY-1&billingToken=BA-1");
        harness.run();

        assert_eq!(
            harness.transport.events(),
            vec![AWAIT_REDIRECT, DETECT_APP_SWITCH, "onApprove"]
        );
        assert_eq!(
            harness.transport.sent_for("onApprove")[0].payload,
            json!({ "payerID": "YYYYYYYYYY", "paymentID": "PAY-1", "billingToken": "BA-1" })
        );
        assert_eq!(harness.window.close_calls(), 1);
        assert_eq!(popup.state(), RedirectState::Destroyed);

        let finished = harness.pool.run_until(popup.finished());
        assert_eq!(
            finished,
            Ok(Some(Outcome::Approve(Approval {
                payer_id: Some("YYYYYYYYYY".into()),
                payment_id: Some("PAY-1".into()),
                subscription_id: None,
                billing_token: Some("BA-1".into()),
            })))
        );
    }

    #[test]
    fn scenario_b_cancel() {
        let mut harness = Harness::new();
        let popup = started(&mut harness);

        harness.detector.trigger();
        harness.window.set_hash("onCancel");
        harness.run();

        assert_eq!(harness.transport.sent_for("onCancel").len(), 1);
        assert!(harness.transport.sent_for("onApprove").is_empty());
        assert!(harness.transport.sent_for("onError").is_empty());
        assert_eq!(harness.window.close_calls(), 1);
        assert_eq!(harness.pool.run_until(popup.finished()), Ok(Some(Outcome::Cancel)));
    }

    #[test]
    fn scenario_c_unrecognized_fragment_reports_error() {
        let mut harness = Harness::new();
        let popup = started(&mut harness);

        harness.window.set_hash("zerk");
        harness.run();

        let errors = harness.transport.sent_for("onError");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].payload["message"].as_str().unwrap().contains("zerk"));
        assert_eq!(harness.window.close_calls(), 1);
        assert_eq!(
            popup.outcome(),
            Some(Outcome::Unrecognized {
                fragment: "zerk".into()
            })
        );
    }

    #[test]
    fn scenario_d_installed_app_is_attached() {
        let mut harness = Harness::new();
        redirect_to_test(&harness);
        let mut session = session();
        session.funding_source = FundingSource::Paypal;
        let mut env = harness.env();
        env.related_apps = Some(Rc::new(FixedRelatedApps::new(vec![RelatedApp {
            id: "com.paypal.android.p2pmobile".into(),
            version: Some("1.0".into()),
        }])));

        let _popup = setup_native_popup(session, NativePopupConfig::default(), env).unwrap();
        harness.run();

        let sent = harness.transport.sent_for(AWAIT_REDIRECT);
        assert_eq!(
            sent[0].payload["app"],
            json!({ "id": "com.paypal.android.p2pmobile", "version": "1.0", "installed": true })
        );
    }

    #[test]
    fn venmo_app_is_matched_for_venmo_funding() {
        let mut harness = Harness::new();
        redirect_to_test(&harness);
        let mut env = harness.env();
        env.related_apps = Some(Rc::new(FixedRelatedApps::new(vec![RelatedApp {
            id: "com.venmo.fifa".into(),
            version: Some("1.0".into()),
        }])));

        let _popup = setup_native_popup(session(), NativePopupConfig::default(), env).unwrap();
        harness.run();

        let sent = harness.transport.sent_for(AWAIT_REDIRECT);
        assert_eq!(sent[0].payload["app"]["installed"], Value::Bool(true));
    }

    #[test]
    fn slow_related_apps_query_is_skipped_after_timeout() {
        let mut harness = Harness::new();
        redirect_to_test(&harness);
        let mut env = harness.env();
        env.related_apps = Some(Rc::new(FixedRelatedApps::pending()));

        let _popup = setup_native_popup(session(), NativePopupConfig::default(), env).unwrap();
        harness.run();
        assert!(harness.transport.sent().is_empty());

        harness.runtime.elapse_all();
        harness.run();

        let sent = harness.transport.sent_for(AWAIT_REDIRECT);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].payload.get("app").is_none());
    }

    #[test]
    fn own_redirect_fragment_is_not_an_outcome() {
        let mut harness = Harness::new();
        let popup = started(&mut harness);

        harness.window.set_hash("test");
        harness.run();

        assert_eq!(harness.transport.events(), vec![AWAIT_REDIRECT]);
        assert!(matches!(popup.state(), RedirectState::Navigated { .. }));
    }

    #[test]
    fn fallback_is_honored_before_app_switch() {
        let mut harness = Harness::new();
        let popup = started(&mut harness);

        harness.window.set_hash("fallback");
        harness.run();

        assert!(!popup.app_switched());
        assert_eq!(harness.transport.sent_for("onFallback").len(), 1);
        assert_eq!(harness.pool.run_until(popup.finished()), Ok(Some(Outcome::Fallback)));
    }

    #[test]
    fn close_fragment_completes() {
        let mut harness = Harness::new();
        let popup = started(&mut harness);

        harness.detector.trigger();
        harness.window.set_hash("close");
        harness.run();

        assert_eq!(harness.transport.sent_for("onComplete").len(), 1);
        assert_eq!(popup.outcome(), Some(Outcome::Complete));
    }

    #[test]
    fn only_first_outcome_is_reported() {
        let mut harness = Harness::new();
        let _popup = started(&mut harness);

        harness.window.set_hash("onCancel");
        harness.window.set_hash("onApprove?payerID=P");
        harness.run();

        assert_eq!(harness.transport.events(), vec![AWAIT_REDIRECT, "onCancel"]);
        assert_eq!(harness.window.close_calls(), 1);
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut harness = Harness::new();
        let popup = started(&mut harness);

        assert_eq!(popup.destroy(), Ok(()));
        assert_eq!(popup.destroy(), Ok(()));
        assert_eq!(harness.window.close_calls(), 1);
        assert_eq!(harness.window.listener_count(), 0);
        assert_eq!(harness.detector.active(), 0);
        assert_eq!(harness.pool.run_until(popup.finished()), Ok(None));
    }

    #[test]
    fn no_outcome_after_destroy() {
        let mut harness = Harness::new();
        let popup = started(&mut harness);

        popup.destroy().unwrap();
        harness.window.set_hash("onApprove?payerID=P&paymentID=M");
        harness.detector.trigger();
        harness.run();

        assert_eq!(harness.transport.events(), vec![AWAIT_REDIRECT]);
        assert!(!popup.app_switched());
    }

    #[test]
    fn destroy_while_awaiting_redirect_never_navigates() {
        let mut harness = Harness::new();
        harness.transport.hold(AWAIT_REDIRECT);
        let popup =
            setup_native_popup(session(), NativePopupConfig::default(), harness.env()).unwrap();
        harness.run();
        assert_eq!(popup.state(), RedirectState::AwaitingRedirectUrl);

        popup.destroy().unwrap();
        harness
            .transport
            .release(AWAIT_REDIRECT, Ok(json!({ "redirectUrl": "#test" })));
        harness.run();

        assert!(harness.window.navigations().is_empty());
        assert_eq!(harness.window.close_calls(), 1);
    }

    #[test]
    fn opener_gone_is_fatal_and_returned_from_destroy() {
        let mut harness = Harness::new();
        harness
            .transport
            .fail_with(AWAIT_REDIRECT, MessengerError::TargetClosed);
        let popup =
            setup_native_popup(session(), NativePopupConfig::default(), harness.env()).unwrap();
        harness.run();

        let expected = NativePopupError::Messenger(MessengerError::TargetClosed);
        assert_eq!(popup.state(), RedirectState::Destroyed);
        assert_eq!(harness.window.close_calls(), 1);
        assert_eq!(harness.transport.sent_for("onError").len(), 1);
        assert_eq!(popup.destroy(), Err(expected.clone()));
        assert_eq!(popup.destroy(), Err(expected.clone()));
        assert_eq!(harness.pool.run_until(popup.finished()), Err(expected));
    }

    #[test]
    fn malformed_redirect_reply_is_fatal() {
        let mut harness = Harness::new();
        harness
            .transport
            .reply_with(AWAIT_REDIRECT, json!({ "url": "#test" }));
        let popup =
            setup_native_popup(session(), NativePopupConfig::default(), harness.env()).unwrap();
        harness.run();

        assert!(matches!(
            popup.destroy(),
            Err(NativePopupError::Messenger(MessengerError::MalformedReply { .. }))
        ));
        assert!(harness.window.navigations().is_empty());
    }

    #[test]
    fn invalid_parent_domain_fails_setup() {
        let harness = Harness::new();
        let mut session = session();
        session.parent_domain = String::new();

        let result = setup_native_popup(session, NativePopupConfig::default(), harness.env());
        assert!(matches!(
            result,
            Err(NativePopupError::Messenger(MessengerError::InvalidDomain(_)))
        ));
        assert!(harness.transport.sent().is_empty());
    }

    #[test]
    fn user_closing_window_tears_down_without_closing_again() {
        let mut harness = Harness::new();
        let popup = started(&mut harness);

        harness.window.user_close();
        harness.run();

        assert_eq!(popup.state(), RedirectState::Destroyed);
        assert_eq!(harness.window.close_calls(), 0);
        assert_eq!(harness.window.listener_count(), 0);
        assert_eq!(harness.pool.run_until(popup.finished()), Ok(None));
    }

    #[test]
    fn failed_navigation_is_fatal() {
        let mut harness = Harness::new();
        harness.window.fail_navigation();
        let popup = started(&mut harness);

        assert!(matches!(
            popup.destroy(),
            Err(NativePopupError::Navigation { .. })
        ));
        assert_eq!(harness.detector.active(), 0);
        assert_eq!(harness.window.close_calls(), 1);
    }

    #[test]
    fn redirect_reply_origin_is_logged() {
        let mut harness = Harness::new();
        let _popup = started(&mut harness);

        let reply = harness
            .sink
            .events()
            .into_iter()
            .find(|event| event.event == "native_popup_redirect_reply")
            .unwrap();
        assert_eq!(reply.payload["origin"], "https://popup.example");
    }

    #[test]
    fn lifecycle_is_logged() {
        let mut harness = Harness::new();
        let popup = started(&mut harness);
        harness.window.set_hash("onCancel");
        harness.run();
        drop(popup);

        let events: Vec<String> = harness.sink.events().into_iter().map(|e| e.event).collect();
        assert!(events.contains(&"native_popup_init".to_string()));
        assert!(events.contains(&"native_popup_redirect_reply".to_string()));
        assert!(events.contains(&"native_popup_redirect".to_string()));
        assert!(events.contains(&"native_popup_outcome".to_string()));
        assert!(events.contains(&"native_popup_destroy".to_string()));
    }
}
