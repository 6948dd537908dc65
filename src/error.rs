use thiserror::Error;

use crate::messenger::MessengerError;

/// Fatal errors of a native popup invocation.
///
/// These are the only failures surfaced to the caller. Unrecognized return
/// fragments become `Outcome::Unrecognized` instead, and app-switch detection
/// never fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NativePopupError {
    #[error("opener messaging failed: {0}")]
    Messenger(#[from] MessengerError),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("browser capability unavailable: {0}")]
    Platform(String),

    #[error("invalid native popup config: {0}")]
    Config(String),

    #[error("native popup was torn down before it finished")]
    Abandoned,
}

impl NativePopupError {
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform(message.into())
    }
}
