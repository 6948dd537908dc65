//! Custom Yew hook running the native popup for the lifetime of a component.
//!
//! # Usage
//! ```rust,ignore
//! use yew::prelude::*;
//! use crate::interop::{use_native_popup, NativePopupStatus};
//!
//! #[function_component(Popup)]
//! fn popup(props: &PopupProps) -> Html {
//!     match use_native_popup(props.session.clone(), NativePopupConfig::default()) {
//!         NativePopupStatus::Failed(err) => html! { <p>{ err.to_string() }</p> },
//!         _ => html! { <Spinner /> },
//!     }
//! }
//! ```

use yew::functional::hook;
use yew::prelude::*;

use crate::client::start_browser_popup;
use crate::config::NativePopupConfig;
use crate::error::NativePopupError;
use crate::outcome::Outcome;
use crate::session::SessionContext;

#[derive(Clone, Debug, PartialEq)]
pub enum NativePopupStatus {
    Starting,
    Running,
    /// Destroyed; carries the reported outcome, if one arrived.
    Finished(Option<Outcome>),
    Failed(NativePopupError),
}

/// Set the popup up on mount and destroy it on unmount.
///
/// A new `session` tears the running popup down and starts another one.
#[hook]
pub fn use_native_popup(session: SessionContext, config: NativePopupConfig) -> NativePopupStatus {
    let status = use_state(|| NativePopupStatus::Starting);

    {
        let status = status.clone();
        use_effect_with(session, move |session| {
            let popup = match start_browser_popup(session.clone(), config) {
                Ok(popup) => {
                    status.set(NativePopupStatus::Running);
                    Some(popup)
                }
                Err(err) => {
                    log::error!(target: "native_popup", "native popup setup failed: {}", err);
                    status.set(NativePopupStatus::Failed(err));
                    None
                }
            };

            if let Some(popup) = &popup {
                let finished = popup.finished();
                wasm_bindgen_futures::spawn_local(async move {
                    match finished.await {
                        Ok(outcome) => status.set(NativePopupStatus::Finished(outcome)),
                        Err(err) => status.set(NativePopupStatus::Failed(err)),
                    }
                });
            }

            move || {
                if let Some(popup) = popup {
                    if let Err(err) = popup.destroy() {
                        log::debug!(target: "native_popup", "destroyed after failure: {}", err);
                    }
                }
            }
        });
    }

    (*status).clone()
}
