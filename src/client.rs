//! Browser wiring for the native popup.
//!
//! This module provides:
//! - `PostRobotTransport`, the opener channel over `paypal.postRobot.send`.
//! - `NavigatorRelatedApps`, the feature-detected `getInstalledRelatedApps` query.
//! - `BrowserRuntime`, `spawn_local` plus `setTimeout` sleeps.
//! - `BeaconSink`, which posts flushed log batches with `navigator.sendBeacon`.
//! - `BroadcastRelayTransport` / `connect_log_relay()` for service-worker logs.
//! - `start_browser_popup()` and the `setupNativePopup` wasm export.
//!
//! # Example Usage
//! ```js
//! import init, { setupNativePopup } from "./native_checkout.js";
//!
//! await init();
//! const popup = setupNativePopup({
//!     parentDomain: "https://www.merchant.example",
//!     env: "production",
//!     sessionID: "...",
//!     buttonSessionID: "...",
//!     sdkCorrelationID: "...",
//!     clientID: "...",
//!     fundingSource: "venmo",
//!     locale: { lang: "en", country: "US" },
//!     buyerCountry: "US",
//! }, { appSwitchDwellMs: 2000 });
//!
//! const outcome = await popup.finished(); // { event: "onApprove", payload: {...} } or null
//! ```

use std::rc::Rc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture};
use gloo_utils::format::JsValueSerdeExt;
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::js_sys::{self, Promise, Reflect};
use web_sys::{BroadcastChannel, MessageEvent, Navigator, Window};

use crate::bindings::{post_robot_send, RelatedAppsNavigator};
use crate::browser::{listen, BrowserWindow, VisibilityDetector};
use crate::config::NativePopupConfig;
use crate::error::NativePopupError;
use crate::log_relay::{forward_logs, LogRelay, RelayRequest, RelayTransport};
use crate::logger::{LogBatch, LogSink};
use crate::messenger::{MessengerError, Reply, Transport};
use crate::popup::{setup_native_popup, NativePopup, PopupEnv, RelatedApps, Runtime};
use crate::session::{RelatedApp, SessionContext};
use crate::subscription::Subscription;

/// Best-effort message of a caught JS value.
pub fn js_error_message(value: JsValue) -> String {
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

/// Convert a rejected `postRobot.send` into a `MessengerError`.
fn js_to_messenger_error(event: &str, value: JsValue) -> MessengerError {
    classify_send_failure(event, js_error_message(value))
}

/// post-robot words "target gone" several ways ("Window closed", "Target
/// window is closed"); any message naming a closed window counts.
fn classify_send_failure(event: &str, message: String) -> MessengerError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("window") && lower.contains("closed") {
        MessengerError::TargetClosed
    } else {
        MessengerError::transport(event, message)
    }
}

fn js_to_native_error(err: NativePopupError) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

/// Sends events to `window.opener` through post-robot.
pub struct PostRobotTransport {
    opener: JsValue,
}

impl PostRobotTransport {
    pub fn new(window: &Window) -> Result<Self, NativePopupError> {
        let opener = window
            .opener()
            .map_err(|err| NativePopupError::platform(js_error_message(err)))?;
        Ok(PostRobotTransport { opener })
    }
}

impl Transport for PostRobotTransport {
    fn send(
        &self,
        event: &str,
        payload: Value,
        domain: &str,
    ) -> LocalBoxFuture<'static, Result<Reply, MessengerError>> {
        if self.opener.is_null() || self.opener.is_undefined() {
            return future::ready(Err(MessengerError::TargetClosed)).boxed_local();
        }

        let event_name = event.to_string();
        let args = JsValue::from_serde(&payload)
            .and_then(|payload| Ok((payload, JsValue::from_serde(&json!({ "domain": domain }))?)));
        let (payload, options) = match args {
            Ok(args) => args,
            Err(err) => {
                return future::ready(Err(MessengerError::transport(event, err.to_string())))
                    .boxed_local()
            }
        };
        let promise = match post_robot_send(&self.opener, event, payload, options) {
            Ok(promise) => promise,
            Err(err) => {
                return future::ready(Err(js_to_messenger_error(event, err))).boxed_local()
            }
        };

        async move {
            let response = JsFuture::from(promise)
                .await
                .map_err(|err| js_to_messenger_error(&event_name, err))?;

            // `source` is a window and cannot go through JSON; pick fields one by one.
            let origin = Reflect::get(&response, &JsValue::from_str("origin"))
                .ok()
                .and_then(|origin| origin.as_string())
                .unwrap_or_default();
            let data = Reflect::get(&response, &JsValue::from_str("data"))
                .map_err(|err| MessengerError::malformed(&event_name, js_error_message(err)))?;
            let data: Value = data
                .into_serde()
                .map_err(|err| MessengerError::malformed(&event_name, err.to_string()))?;

            Ok(Reply { origin, data })
        }
        .boxed_local()
    }
}

/// `navigator.getInstalledRelatedApps`, where the browser has it.
pub struct NavigatorRelatedApps {
    navigator: RelatedAppsNavigator,
}

impl NavigatorRelatedApps {
    pub fn detect(window: &Window) -> Option<Self> {
        let navigator = window.navigator();
        let supported =
            Reflect::has(&navigator, &JsValue::from_str("getInstalledRelatedApps")).unwrap_or(false);
        supported.then(|| NavigatorRelatedApps {
            navigator: navigator.unchecked_into(),
        })
    }
}

impl RelatedApps for NavigatorRelatedApps {
    fn installed_related_apps(&self) -> LocalBoxFuture<'static, Result<Vec<RelatedApp>, String>> {
        let promise = match self.navigator.get_installed_related_apps() {
            Ok(promise) => promise,
            Err(err) => return future::ready(Err(js_error_message(err))).boxed_local(),
        };
        async move {
            let apps = JsFuture::from(promise).await.map_err(js_error_message)?;
            serde_wasm_bindgen::from_value(apps).map_err(|err| err.to_string())
        }
        .boxed_local()
    }
}

/// Clears its timeout when dropped, so an abandoned sleep never calls into
/// a freed closure.
struct Timeout {
    window: Window,
    handle: i32,
    _callback: Closure<dyn FnMut()>,
}

impl Drop for Timeout {
    fn drop(&mut self) {
        self.window.clear_timeout_with_handle(self.handle);
    }
}

pub struct BrowserRuntime {
    window: Window,
}

impl BrowserRuntime {
    pub fn new(window: Window) -> Self {
        BrowserRuntime { window }
    }
}

impl Runtime for BrowserRuntime {
    fn spawn(&self, future: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(future);
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        let (sender, receiver) = oneshot::channel::<()>();
        let mut sender = Some(sender);
        let callback = Closure::<dyn FnMut()>::new(move || {
            if let Some(sender) = sender.take() {
                let _ = sender.send(());
            }
        });

        let millis = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
        match self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                callback.as_ref().unchecked_ref(),
                millis,
            ) {
            Ok(handle) => {
                let timeout = Timeout {
                    window: self.window.clone(),
                    handle,
                    _callback: callback,
                };
                async move {
                    let _timeout = timeout;
                    let _ = receiver.await;
                }
                .boxed_local()
            }
            Err(err) => {
                log::warn!(target: "native_popup", "setTimeout failed: {}", js_error_message(err));
                future::ready(()).boxed_local()
            }
        }
    }
}

/// Posts each flushed batch as JSON with `navigator.sendBeacon`.
pub struct BeaconSink {
    navigator: Navigator,
    url: String,
}

impl BeaconSink {
    pub fn new(navigator: Navigator, url: &str) -> Self {
        BeaconSink {
            navigator,
            url: url.to_string(),
        }
    }
}

impl LogSink for BeaconSink {
    fn deliver(&self, batch: LogBatch) {
        let body = match serde_json::to_string(&batch) {
            Ok(body) => body,
            Err(err) => {
                log::error!(target: "native_popup", "cannot serialize log batch: {}", err);
                return;
            }
        };
        match self.navigator.send_beacon_with_opt_str(&self.url, Some(&body)) {
            Ok(true) => {}
            Ok(false) => log::warn!(target: "native_popup", "beacon queue full, dropped log batch"),
            Err(err) => log::warn!(target: "native_popup", "sendBeacon failed: {}", js_error_message(err)),
        }
    }
}

pub struct BroadcastRelayTransport {
    channel: BroadcastChannel,
}

impl RelayTransport for BroadcastRelayTransport {
    fn post(&self, request: &RelayRequest) -> Result<(), String> {
        let message = JsValue::from_serde(request).map_err(|err| err.to_string())?;
        self.channel.post_message(&message).map_err(js_error_message)
    }
}

/// Open the service-worker log channel. Responses are routed to the relay
/// for as long as the subscription lives.
pub fn connect_log_relay(channel_name: &str) -> Result<(Rc<LogRelay>, Subscription), NativePopupError> {
    let channel = BroadcastChannel::new(channel_name)
        .map_err(|err| NativePopupError::platform(js_error_message(err)))?;
    let relay = Rc::new(LogRelay::new(Rc::new(BroadcastRelayTransport {
        channel: channel.clone(),
    })));

    let weak = Rc::downgrade(&relay);
    let listener = listen(&channel, "message", move |event| {
        let (Some(relay), Some(event)) = (weak.upgrade(), event.dyn_ref::<MessageEvent>()) else {
            return;
        };
        if let Ok(data) = event.data().into_serde::<Value>() {
            relay.handle_message(data);
        }
    })
    .map_err(|err| NativePopupError::platform(js_error_message(err)))?;

    let subscription = Subscription::new(move || {
        listener.cancel();
        channel.close();
    });
    Ok((relay, subscription))
}

impl PopupEnv {
    /// Capabilities of the current browser window.
    pub fn browser(config: &NativePopupConfig) -> Result<Self, NativePopupError> {
        let window = BrowserWindow::new()?;
        let raw = window.window().clone();
        let related_apps = NavigatorRelatedApps::detect(&raw)
            .map(|apps| Rc::new(apps) as Rc<dyn RelatedApps>);

        Ok(PopupEnv {
            transport: Rc::new(PostRobotTransport::new(&raw)?),
            detector: Rc::new(VisibilityDetector::new(raw.clone(), config.app_switch_dwell())),
            related_apps,
            runtime: Rc::new(BrowserRuntime::new(raw.clone())),
            log_sink: Rc::new(BeaconSink::new(raw.navigator(), &config.logger_url)),
            window: Rc::new(window),
            clock: js_sys::Date::now,
        })
    }
}

/// Set the popup up in the current window and pull any service-worker logs
/// into its logger while it runs.
pub fn start_browser_popup(
    session: SessionContext,
    config: NativePopupConfig,
) -> Result<NativePopup, NativePopupError> {
    let env = PopupEnv::browser(&config)?;
    let channel_name = config.logs_channel_name.clone();
    let popup = setup_native_popup(session, config, env)?;

    match connect_log_relay(&channel_name) {
        Ok((relay, subscription)) => {
            let logger = popup.logger();
            let finished = popup.finished();
            wasm_bindgen_futures::spawn_local(async move {
                let _subscription = subscription;
                let forward = forward_logs(relay, logger).boxed_local();
                if let future::Either::Left((Err(err), _)) = future::select(forward, finished).await {
                    log::debug!(target: "native_popup", "service worker logs unavailable: {}", err);
                }
            });
        }
        Err(err) => log::debug!(target: "native_popup", "no log channel: {}", err),
    }

    Ok(popup)
}

/// JS handle returned by `setupNativePopup`.
#[wasm_bindgen]
pub struct NativePopupHandle {
    popup: NativePopup,
}

#[wasm_bindgen]
impl NativePopupHandle {
    /// Tear the popup down. Rejects with the invocation's fatal error, if any.
    pub fn destroy(&self) -> Promise {
        let result = self.popup.destroy();
        future_to_promise(async move {
            result
                .map(|()| JsValue::UNDEFINED)
                .map_err(js_to_native_error)
        })
    }

    /// Resolves with `{ event, payload }` of the reported outcome, or `null`.
    pub fn finished(&self) -> Promise {
        let finished = self.popup.finished();
        future_to_promise(async move {
            match finished.await {
                Ok(Some(outcome)) => JsValue::from_serde(&json!({
                    "event": outcome.event_name(),
                    "payload": outcome.payload(),
                }))
                .map_err(|err| JsValue::from_str(&err.to_string())),
                Ok(None) => Ok(JsValue::NULL),
                Err(err) => Err(js_to_native_error(err)),
            }
        })
    }
}

#[wasm_bindgen(js_name = setupNativePopup)]
pub fn setup_native_popup_js(props: JsValue, config: JsValue) -> Result<NativePopupHandle, JsValue> {
    let session: SessionContext = serde_wasm_bindgen::from_value(props)
        .map_err(|err| js_to_native_error(NativePopupError::Config(err.to_string())))?;
    let config = NativePopupConfig::from_js(config).map_err(js_to_native_error)?;
    let popup = start_browser_popup(session, config).map_err(js_to_native_error)?;
    Ok(NativePopupHandle { popup })
}
