//! Browser implementations of the popup window and the app-switch detector.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use wasm_bindgen::prelude::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Event, EventTarget, VisibilityState, Window};

use crate::client::js_error_message;
use crate::coordinator::PopupWindow;
use crate::detector::{AppSwitchDetector, FocusSignal, HeuristicStep, SwitchHeuristic};
use crate::error::NativePopupError;
use crate::subscription::Subscription;

/// Register `handler` for `event` on `target`.
///
/// The listener is removed as soon as the subscription is cancelled. The
/// closure itself is dropped on the next tick, since cancellation may happen
/// from inside the handler.
pub fn listen(
    target: &EventTarget,
    event: &'static str,
    handler: impl FnMut(Event) + 'static,
) -> Result<Subscription, JsValue> {
    let closure = Closure::<dyn FnMut(Event)>::new(handler);
    target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())?;

    let target = target.clone();
    Ok(Subscription::new(move || {
        if let Err(err) =
            target.remove_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
        {
            log::warn!(target: "native_popup", "removing {} listener failed: {}", event, js_error_message(err));
        }
        wasm_bindgen_futures::spawn_local(async move { drop(closure) });
    }))
}

fn listen_or_log(
    target: &EventTarget,
    event: &'static str,
    handler: impl FnMut(Event) + 'static,
) -> Subscription {
    listen(target, event, handler).unwrap_or_else(|err| {
        log::warn!(target: "native_popup", "cannot listen for {}: {}", event, js_error_message(err));
        Subscription::noop()
    })
}

fn global_window() -> Result<Window, NativePopupError> {
    web_sys::window().ok_or_else(|| NativePopupError::platform("no global window"))
}

/// The popup's own `window`.
#[derive(Clone, Debug)]
pub struct BrowserWindow {
    window: Window,
}

impl BrowserWindow {
    pub fn new() -> Result<Self, NativePopupError> {
        Ok(BrowserWindow {
            window: global_window()?,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl PopupWindow for BrowserWindow {
    fn page_url(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn navigate(&self, url: &str) -> Result<(), String> {
        self.window
            .location()
            .set_href(url)
            .map_err(js_error_message)
    }

    fn close(&self) {
        if let Err(err) = self.window.close() {
            log::warn!(target: "native_popup", "window.close() failed: {}", js_error_message(err));
        }
    }

    fn on_fragment_change(&self, mut callback: Box<dyn FnMut(String)>) -> Subscription {
        let location = self.window.location();
        listen_or_log(&self.window, "hashchange", move |_| {
            let hash = location.hash().unwrap_or_default();
            callback(hash.trim_start_matches('#').to_string());
        })
    }

    fn on_closed(&self, callback: Box<dyn FnOnce()>) -> Subscription {
        let mut callback = Some(callback);
        listen_or_log(&self.window, "pagehide", move |_| {
            if let Some(callback) = callback.take() {
                callback();
            }
        })
    }
}

/// App-switch detector over `visibilitychange`, `blur` and `focus`, with a
/// dwell timer for platforms that hide the page without ever refocusing it.
#[derive(Clone, Debug)]
pub struct VisibilityDetector {
    window: Window,
    dwell: Duration,
}

impl VisibilityDetector {
    pub fn new(window: Window, dwell: Duration) -> Self {
        VisibilityDetector { window, dwell }
    }
}

struct Watch {
    heuristic: SwitchHeuristic,
    on_switch: Option<Box<dyn FnOnce()>>,
    timer: Option<(i32, Closure<dyn FnMut()>)>,
}

impl AppSwitchDetector for VisibilityDetector {
    fn watch(&self, on_switch: Box<dyn FnOnce()>) -> Subscription {
        let Some(document) = self.window.document() else {
            log::warn!(target: "native_popup", "no document; app switch detection disabled");
            return Subscription::noop();
        };

        let watch = Rc::new(RefCell::new(Watch {
            heuristic: SwitchHeuristic::new(),
            on_switch: Some(on_switch),
            timer: None,
        }));
        let dwell_ms = i32::try_from(self.dwell.as_millis()).unwrap_or(i32::MAX);

        let visibility = {
            let watch = watch.clone();
            let window = self.window.clone();
            let doc = document.clone();
            listen_or_log(&document, "visibilitychange", move |_| {
                let signal = match doc.visibility_state() {
                    VisibilityState::Hidden => FocusSignal::Hidden,
                    _ => FocusSignal::Visible,
                };
                observe(&watch, &window, dwell_ms, signal);
            })
        };
        let blur = {
            let watch = watch.clone();
            let window = self.window.clone();
            listen_or_log(&self.window, "blur", move |_| {
                observe(&watch, &window, dwell_ms, FocusSignal::Blur)
            })
        };
        let focus = {
            let watch = watch.clone();
            let window = self.window.clone();
            listen_or_log(&self.window, "focus", move |_| {
                observe(&watch, &window, dwell_ms, FocusSignal::Focus)
            })
        };

        let window = self.window.clone();
        Subscription::new(move || {
            visibility.cancel();
            blur.cancel();
            focus.cancel();
            let mut watch = watch.borrow_mut();
            watch.on_switch = None;
            clear_timer(&window, &mut watch);
        })
    }
}

fn observe(watch: &Rc<RefCell<Watch>>, window: &Window, dwell_ms: i32, signal: FocusSignal) {
    let step = watch.borrow_mut().heuristic.observe(signal);
    match step {
        HeuristicStep::Idle => {}
        HeuristicStep::ArmDwell => arm_dwell(watch, window, dwell_ms),
        HeuristicStep::Detected => fire(watch, window),
    }
}

fn arm_dwell(watch: &Rc<RefCell<Watch>>, window: &Window, dwell_ms: i32) {
    let weak = Rc::downgrade(watch);
    let timer_window = window.clone();
    let closure = Closure::<dyn FnMut()>::new(move || {
        if let Some(watch) = weak.upgrade() {
            let step = watch.borrow_mut().heuristic.dwell_elapsed();
            if step == HeuristicStep::Detected {
                fire(&watch, &timer_window);
            }
        }
    });

    match window.set_timeout_with_callback_and_timeout_and_arguments_0(
        closure.as_ref().unchecked_ref(),
        dwell_ms,
    ) {
        Ok(handle) => {
            let mut watch = watch.borrow_mut();
            clear_timer(window, &mut watch);
            watch.timer = Some((handle, closure));
        }
        Err(err) => {
            log::warn!(target: "native_popup", "dwell timer unavailable: {}", js_error_message(err));
        }
    }
}

fn fire(watch: &Rc<RefCell<Watch>>, window: &Window) {
    let on_switch = {
        let mut watch = watch.borrow_mut();
        if let Some((handle, _)) = &watch.timer {
            window.clear_timeout_with_handle(*handle);
        }
        watch.on_switch.take()
    };
    if let Some(on_switch) = on_switch {
        on_switch();
    }
}

fn clear_timer(window: &Window, watch: &mut Watch) {
    if let Some((handle, closure)) = watch.timer.take() {
        window.clear_timeout_with_handle(handle);
        wasm_bindgen_futures::spawn_local(async move { drop(closure) });
    }
}
