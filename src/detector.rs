//! App-switch detection.
//!
//! When the OS hands the buyer over to the native app, the popup page loses
//! focus and usually becomes hidden; when the app sends the buyer back it
//! regains focus. Detecting that round trip is a heuristic: it feeds
//! telemetry and the opener's UX, never the outcome itself.

use std::cell::Cell;

use crate::subscription::Subscription;

/// Capability interface for app-switch detection.
///
/// `on_switch` fires at most once. Cancelling the returned subscription
/// unregisters every listener and timer synchronously.
pub trait AppSwitchDetector {
    fn watch(&self, on_switch: Box<dyn FnOnce()>) -> Subscription;
}

/// Monotonic app-switch flag: false → true, never back.
#[derive(Debug, Default)]
pub struct AppSwitchLatch {
    switched: Cell<bool>,
}

impl AppSwitchLatch {
    /// Returns `true` only for the call that flipped the latch.
    pub fn set(&self) -> bool {
        !self.switched.replace(true)
    }

    pub fn has_switched(&self) -> bool {
        self.switched.get()
    }
}

/// Page lifecycle signals the heuristic consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusSignal {
    Hidden,
    Visible,
    Blur,
    Focus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicStep {
    Idle,
    /// Focus was lost; start the dwell timer.
    ArmDwell,
    Detected,
}

/// Pure focus-loss/focus-regain state machine behind the browser detector.
#[derive(Debug, Default)]
pub struct SwitchHeuristic {
    lost_focus: bool,
    hidden: bool,
    detected: bool,
}

impl SwitchHeuristic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, signal: FocusSignal) -> HeuristicStep {
        if self.detected {
            return HeuristicStep::Idle;
        }

        match signal {
            // The dwell is measured from the moment the page is hidden, so a
            // visible-to-hidden transition re-arms it even after a blur.
            FocusSignal::Hidden => {
                let was_hidden = std::mem::replace(&mut self.hidden, true);
                self.lost_focus = true;
                if was_hidden {
                    HeuristicStep::Idle
                } else {
                    HeuristicStep::ArmDwell
                }
            }
            FocusSignal::Blur => {
                if self.lost_focus {
                    HeuristicStep::Idle
                } else {
                    self.lost_focus = true;
                    HeuristicStep::ArmDwell
                }
            }
            FocusSignal::Visible | FocusSignal::Focus => {
                self.hidden = false;
                if self.lost_focus {
                    self.detected = true;
                    HeuristicStep::Detected
                } else {
                    HeuristicStep::Idle
                }
            }
        }
    }

    /// Dwell timer fired; counts as a switch only if the page is still hidden.
    pub fn dwell_elapsed(&mut self) -> HeuristicStep {
        if !self.detected && self.hidden {
            self.detected = true;
            HeuristicStep::Detected
        } else {
            HeuristicStep::Idle
        }
    }

    pub fn detected(&self) -> bool {
        self.detected
    }
}
