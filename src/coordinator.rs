//! Redirect coordination.
//!
//! The coordinator is a pure state machine: it takes [`Command`]s and answers
//! with the [`Effect`]s the caller has to carry out. Keeping it free of I/O
//! is what lets the popup guarantee "one redirect request, one navigation,
//! one outcome, one close" no matter in which order browser events arrive.

use crate::outcome::{self, Outcome};
use crate::messenger::AwaitRedirectRequest;
use crate::session::InstalledApp;
use crate::subscription::Subscription;

/// The popup window this code runs in.
pub trait PopupWindow {
    /// Current `location.href`.
    fn page_url(&self) -> String;

    fn navigate(&self, url: &str) -> Result<(), String>;

    fn close(&self);

    /// Fires with the new fragment (without `#`) on every `hashchange`.
    fn on_fragment_change(&self, callback: Box<dyn FnMut(String)>) -> Subscription;

    /// Fires when the user closes the popup or navigates it away.
    fn on_closed(&self, callback: Box<dyn FnOnce()>) -> Subscription;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectState {
    Idle,
    AwaitingRedirectUrl,
    Navigated {
        /// Fragment of the redirect URL itself; seeing it again is not an outcome.
        own_fragment: Option<String>,
    },
    Resolved(Outcome),
    Destroyed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start {
        page_url: String,
        app: Option<InstalledApp>,
    },
    RedirectUrl(String),
    Fragment(String),
    WindowClosed,
    Destroy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    RequestRedirect(AwaitRedirectRequest),
    Navigate(String),
    WatchAppSwitch,
    Report(Outcome),
    ReleaseListeners,
    CloseWindow,
}

#[derive(Debug)]
pub struct RedirectCoordinator {
    state: RedirectState,
}

impl Default for RedirectCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RedirectCoordinator {
    pub fn new() -> Self {
        RedirectCoordinator {
            state: RedirectState::Idle,
        }
    }

    pub fn state(&self) -> &RedirectState {
        &self.state
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == RedirectState::Destroyed
    }

    /// Apply one command. Commands that make no sense in the current state
    /// are dropped and produce no effects.
    pub fn handle(&mut self, command: Command) -> Vec<Effect> {
        let state = std::mem::replace(&mut self.state, RedirectState::Destroyed);
        let (next, effects) = transition(state, command);
        self.state = next;
        effects
    }
}

fn transition(state: RedirectState, command: Command) -> (RedirectState, Vec<Effect>) {
    use RedirectState::*;

    match (state, command) {
        (Destroyed, _) => (Destroyed, Vec::new()),

        (_, Command::Destroy) => (
            Destroyed,
            vec![Effect::ReleaseListeners, Effect::CloseWindow],
        ),
        (_, Command::WindowClosed) => (Destroyed, vec![Effect::ReleaseListeners]),

        (Idle, Command::Start { page_url, app }) => (
            AwaitingRedirectUrl,
            vec![Effect::RequestRedirect(AwaitRedirectRequest {
                page_url: return_page_url(&page_url),
                app,
            })],
        ),

        (AwaitingRedirectUrl, Command::RedirectUrl(url)) => {
            let own_fragment = url
                .split_once('#')
                .map(|(_, fragment)| fragment.to_string());
            (
                Navigated { own_fragment },
                vec![Effect::Navigate(url), Effect::WatchAppSwitch],
            )
        }

        (Navigated { own_fragment }, Command::Fragment(raw)) => {
            let fragment = raw.strip_prefix('#').unwrap_or(&raw);
            if fragment.is_empty() || own_fragment.as_deref() == Some(fragment) {
                return (Navigated { own_fragment }, Vec::new());
            }
            let outcome = outcome::parse(fragment);
            (
                Resolved(outcome.clone()),
                vec![Effect::ReleaseListeners, Effect::Report(outcome)],
            )
        }

        (state, command) => {
            log::debug!(target: "native_popup", "ignoring {:?} while {:?}", command, state);
            (state, Vec::new())
        }
    }
}

/// `href` with its fragment replaced by `#close`: the page the native app
/// returns to, which resolves the popup as complete.
pub fn return_page_url(href: &str) -> String {
    let base = href.split_once('#').map(|(base, _)| base).unwrap_or(href);
    format!("{}#close", base)
}
