//! Session inputs for one native popup invocation.
//!
//! Everything here is created once, when the popup page boots, and read-only
//! afterwards. The JS side hands these over as a plain props object, so the
//! serde names follow the SDK's camelCase keys.

use serde::{Deserialize, Serialize};

/// Funding source the buyer picked on the button.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FundingSource {
    Paypal,
    Venmo,
    Credit,
    Paylater,
    Card,
    #[serde(other)]
    Other,
}

impl FundingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundingSource::Paypal => "paypal",
            FundingSource::Venmo => "venmo",
            FundingSource::Credit => "credit",
            FundingSource::Paylater => "paylater",
            FundingSource::Card => "card",
            FundingSource::Other => "other",
        }
    }
}

/// SDK environment the button was rendered in.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    Local,
    Stage,
    Sandbox,
    Production,
    Test,
}

impl Env {
    pub fn as_str(&self) -> &'static str {
        match self {
            Env::Local => "local",
            Env::Stage => "stage",
            Env::Sandbox => "sandbox",
            Env::Production => "production",
            Env::Test => "test",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Locale {
    pub lang: String,
    pub country: String,
}

impl Locale {
    /// `en_US` style tag used in tracking payloads.
    pub fn tag(&self) -> String {
        format!("{}_{}", self.lang, self.country)
    }
}

/// Immutable input bundle for `setup_native_popup`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    /// Domain of the opener; every cross-window message is pinned to it.
    pub parent_domain: String,
    pub env: Env,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "buttonSessionID")]
    pub button_session_id: String,
    #[serde(rename = "sdkCorrelationID")]
    pub sdk_correlation_id: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub funding_source: FundingSource,
    pub locale: Locale,
    pub buyer_country: String,
}

/// One entry of `navigator.getInstalledRelatedApps()`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelatedApp {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Installed-app metadata attached to the `awaitRedirect` request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct InstalledApp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub installed: bool,
}

impl InstalledApp {
    pub fn not_installed() -> Self {
        InstalledApp {
            id: None,
            version: None,
            installed: false,
        }
    }
}

/// Pick the first related app whose id is one of `app_ids`.
///
/// A successful query with no match still produces a descriptor, with
/// `installed: false`, so the opener can tell "not installed" apart from
/// "could not check".
pub fn match_installed_app(related: &[RelatedApp], app_ids: &[String]) -> InstalledApp {
    related
        .iter()
        .find(|app| app_ids.iter().any(|id| id == &app.id))
        .map(|app| InstalledApp {
            id: Some(app.id.clone()),
            version: app.version.clone(),
            installed: true,
        })
        .unwrap_or_else(InstalledApp::not_installed)
}
