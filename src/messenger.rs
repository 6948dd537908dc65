//! Cross-window messaging with the opener.
//!
//! The popup only ever talks to one window, the one that opened it, and every
//! message is pinned to the parent domain the session was created with. The
//! actual postMessage plumbing sits behind [`Transport`] so the flow can be
//! driven without a browser.

use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::{Host, Url};

use crate::session::InstalledApp;

pub const AWAIT_REDIRECT: &str = "awaitRedirect";
pub const DETECT_APP_SWITCH: &str = "detectAppSwitch";
pub const ON_APPROVE: &str = "onApprove";
pub const ON_CANCEL: &str = "onCancel";
pub const ON_ERROR: &str = "onError";
pub const ON_FALLBACK: &str = "onFallback";
pub const ON_COMPLETE: &str = "onComplete";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessengerError {
    #[error("opener window is closed or unreachable")]
    TargetClosed,

    #[error("malformed reply to {event}: {message}")]
    MalformedReply { event: String, message: String },

    #[error("invalid parent domain {0:?}")]
    InvalidDomain(String),

    #[error("transport rejected {event}: {message}")]
    Transport { event: String, message: String },
}

impl MessengerError {
    pub fn malformed(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedReply {
            event: event.into(),
            message: message.into(),
        }
    }

    pub fn transport(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            event: event.into(),
            message: message.into(),
        }
    }
}

/// Correlated reply from the opener.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub origin: String,
    pub data: Value,
}

/// Request/response messaging to the opener window.
///
/// Implementations own the reference to the target window and resolve once
/// the correlated reply arrives, or fail when the target is gone.
pub trait Transport {
    fn send(
        &self,
        event: &str,
        payload: Value,
        domain: &str,
    ) -> LocalBoxFuture<'static, Result<Reply, MessengerError>>;
}

/// Payload of the `awaitRedirect` request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwaitRedirectRequest {
    /// Where the native app should send the buyer back to.
    pub page_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<InstalledApp>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedirectReply {
    pub redirect_url: String,
    /// Origin the reply came from; filled in from the transport, not the payload.
    #[serde(skip)]
    pub origin: String,
}

/// Accepts a bare host (`foo.paypal.com`) or an origin (`https://foo.paypal.com`).
pub fn validate_domain(domain: &str) -> Result<(), MessengerError> {
    let trimmed = domain.trim();
    if trimmed.is_empty() || trimmed != domain {
        return Err(MessengerError::InvalidDomain(domain.to_string()));
    }

    let valid = if domain.contains("://") {
        Url::parse(domain)
            .map(|url| url.host().is_some() && url.path() == "/" && url.query().is_none())
            .unwrap_or(false)
    } else {
        Host::parse(domain).is_ok()
    };

    if valid {
        Ok(())
    } else {
        Err(MessengerError::InvalidDomain(domain.to_string()))
    }
}

/// A transport bound to the opener's domain.
#[derive(Clone)]
pub struct OpenerChannel {
    transport: Rc<dyn Transport>,
    domain: String,
}

impl OpenerChannel {
    /// Fails with [`MessengerError::InvalidDomain`]; that is a configuration
    /// error and is never retried.
    pub fn new(transport: Rc<dyn Transport>, domain: &str) -> Result<Self, MessengerError> {
        validate_domain(domain)?;
        Ok(OpenerChannel {
            transport,
            domain: domain.to_string(),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn send(
        &self,
        event: &str,
        payload: Value,
    ) -> LocalBoxFuture<'static, Result<Reply, MessengerError>> {
        log::debug!(target: "native_popup", "sending {} to {}", event, self.domain);
        let reply = self.transport.send(event, payload, &self.domain);
        let event = event.to_string();
        async move {
            let reply = reply.await?;
            log::debug!(target: "native_popup", "{} acknowledged by {}", event, reply.origin);
            Ok(reply)
        }
        .boxed_local()
    }

    /// Ask the opener where to navigate.
    pub fn await_redirect(
        &self,
        request: &AwaitRedirectRequest,
    ) -> LocalBoxFuture<'static, Result<RedirectReply, MessengerError>> {
        let payload = match serde_json::to_value(request) {
            Ok(payload) => payload,
            Err(err) => {
                let err = MessengerError::malformed(AWAIT_REDIRECT, err.to_string());
                return async move { Err(err) }.boxed_local();
            }
        };
        let reply = self.send(AWAIT_REDIRECT, payload);

        async move {
            let reply = reply.await?;
            let mut redirect = serde_json::from_value::<RedirectReply>(reply.data)
                .map_err(|err| MessengerError::malformed(AWAIT_REDIRECT, err.to_string()))?;
            redirect.origin = reply.origin;
            Ok(redirect)
        }
        .boxed_local()
    }
}
