//! Terminal outcomes and the URL fragment format that carries them.
//!
//! The server redirect page and the native app's return deep link write the
//! result into `location.hash`:
//!
//! | fragment                                   | outcome        |
//! |--------------------------------------------|----------------|
//! | `onApprove?payerID=..&paymentID=..`        | `Approve`      |
//! | `onCancel`                                 | `Cancel`       |
//! | `onError?message=..`                       | `Error`        |
//! | `fallback`                                 | `Fallback`     |
//! | `close`                                    | `Complete`     |
//! | anything else                              | `Unrecognized` |

use serde_json::{json, Map, Value};
use url::form_urlencoded;

use crate::messenger::{ON_APPROVE, ON_CANCEL, ON_COMPLETE, ON_ERROR, ON_FALLBACK};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Approval {
    pub payer_id: Option<String>,
    pub payment_id: Option<String>,
    pub subscription_id: Option<String>,
    pub billing_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Approve(Approval),
    Cancel,
    Error { message: Option<String> },
    Fallback,
    Complete,
    Unrecognized { fragment: String },
}

/// Decode a fragment into an outcome. Never fails: unknown input is
/// `Unrecognized`, and missing query parameters stay `None`.
pub fn parse(fragment: &str) -> Outcome {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    let (path, query) = match fragment.split_once('?') {
        Some((path, query)) => (path, query),
        None => (fragment, ""),
    };

    match path {
        "onApprove" => Outcome::Approve(Approval {
            payer_id: query_param(query, "payerID"),
            payment_id: query_param(query, "paymentID"),
            subscription_id: query_param(query, "subscriptionID"),
            billing_token: query_param(query, "billingToken"),
        }),
        "onCancel" => Outcome::Cancel,
        "onError" => Outcome::Error {
            message: query_param(query, "message"),
        },
        "fallback" => Outcome::Fallback,
        "close" => Outcome::Complete,
        _ => Outcome::Unrecognized {
            fragment: fragment.to_string(),
        },
    }
}

fn query_param(query: &str, name: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

impl Outcome {
    /// Opener event this outcome is reported with.
    pub fn event_name(&self) -> &'static str {
        match self {
            Outcome::Approve(_) => ON_APPROVE,
            Outcome::Cancel => ON_CANCEL,
            Outcome::Error { .. } | Outcome::Unrecognized { .. } => ON_ERROR,
            Outcome::Fallback => ON_FALLBACK,
            Outcome::Complete => ON_COMPLETE,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Outcome::Approve(approval) => {
                let mut payload = Map::new();
                let fields = [
                    ("payerID", &approval.payer_id),
                    ("paymentID", &approval.payment_id),
                    ("subscriptionID", &approval.subscription_id),
                    ("billingToken", &approval.billing_token),
                ];
                for (key, value) in fields {
                    if let Some(value) = value {
                        payload.insert(key.to_string(), Value::String(value.clone()));
                    }
                }
                Value::Object(payload)
            }
            Outcome::Error { message } => match message {
                Some(message) => json!({ "message": message }),
                None => json!({}),
            },
            Outcome::Unrecognized { fragment } => json!({
                "message": format!("Unrecognized native popup hash: {}", fragment),
                "hash": fragment,
            }),
            Outcome::Cancel | Outcome::Fallback | Outcome::Complete => json!({}),
        }
    }

    /// Short name used in logs and tracking.
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Approve(_) => "approve",
            Outcome::Cancel => "cancel",
            Outcome::Error { .. } => "error",
            Outcome::Fallback => "fallback",
            Outcome::Complete => "complete",
            Outcome::Unrecognized { .. } => "unrecognized",
        }
    }
}
