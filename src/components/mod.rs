use yew::prelude::*;

/// Props shared by the loading spinners.
#[derive(Properties, PartialEq)]
pub struct SpinnerProps {
    /// CSP nonce for the inline style block
    #[prop_or_default]
    pub nonce: Option<String>,
}

/// Generic loading spinner shown while the popup hands off to the native app.
#[function_component(Spinner)]
pub fn spinner(props: &SpinnerProps) -> Html {
    html! {
        <div class="spinner" data-nonce={props.nonce.clone()}>
            <style nonce={props.nonce.clone()}>
                { SPINNER_STYLE }
            </style>
            <div class="spinner-ring" />
        </div>
    }
}

/// Venmo-branded spinner.
#[function_component(VenmoSpinner)]
pub fn venmo_spinner(props: &SpinnerProps) -> Html {
    html! {
        <div class="spinner venmo-spinner" data-nonce={props.nonce.clone()}>
            <style nonce={props.nonce.clone()}>
                { SPINNER_STYLE }
                { VENMO_STYLE }
            </style>
            <div class="spinner-ring" />
        </div>
    }
}

const SPINNER_STYLE: &str = "\
.spinner { position: fixed; inset: 0; display: flex; align-items: center; justify-content: center; background: #fff; }\
.spinner-ring { width: 48px; height: 48px; border: 4px solid rgba(0, 0, 0, .15); border-top-color: #0070ba; border-radius: 50%; animation: spinner-rotate .8s linear infinite; }\
@keyframes spinner-rotate { to { transform: rotate(360deg); } }";

const VENMO_STYLE: &str = "\
.venmo-spinner { background: #008cff; }\
.venmo-spinner .spinner-ring { border-color: rgba(255, 255, 255, .3); border-top-color: #fff; }";
