//! Drop-in page component for the native popup window.
//!
//! Renders the funding-source spinner while the buyer is in the native app
//! and drives the popup through [`use_native_popup`].

use yew::prelude::*;

use crate::components::{Spinner, VenmoSpinner};
use crate::config::NativePopupConfig;
use crate::interop::{use_native_popup, NativePopupStatus};
use crate::session::{FundingSource, SessionContext};

/// Properties for the [`NativePopupPage`] component.
///
/// * `session` – Session ids, opener domain and funding source.
/// * `config` – Tunables; defaults apply when omitted.
/// * `csp_nonce` – Nonce applied to the spinner's inline style.
/// * `on_finished` – Emitted once with the final status.
#[derive(Properties, PartialEq, Clone)]
pub struct NativePopupPageProps {
    pub session: SessionContext,
    #[prop_or_default]
    pub config: NativePopupConfig,
    #[prop_or_default]
    pub csp_nonce: Option<String>,
    #[prop_or_default]
    pub on_finished: Callback<NativePopupStatus>,
}

/// # Example
///
/// ```rust,ignore
/// html! {
///     <NativePopupPage session={session} csp_nonce={Some(nonce)} />
/// }
/// ```
#[function_component(NativePopupPage)]
pub fn native_popup_page(props: &NativePopupPageProps) -> Html {
    let status = use_native_popup(props.session.clone(), props.config.clone());

    {
        let on_finished = props.on_finished.clone();
        use_effect_with(status.clone(), move |status| {
            if matches!(
                status,
                NativePopupStatus::Finished(_) | NativePopupStatus::Failed(_)
            ) {
                on_finished.emit(status.clone());
            }
            || ()
        });
    }

    let nonce = props.csp_nonce.clone();
    match props.session.funding_source {
        FundingSource::Venmo => html! { <VenmoSpinner {nonce} /> },
        _ => html! { <Spinner {nonce} /> },
    }
}
