//! Tunables for the native popup.
//!
//! The timing values were tuned against mobile browser polling latency and are
//! not a contract; hosts can override any of them from the props object.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;

use crate::error::NativePopupError;
use crate::session::FundingSource;

pub const DEFAULT_APP_SWITCH_DWELL_MS: u64 = 1500;
pub const DEFAULT_INSTALLED_APPS_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_LOGGER_URL: &str = "/xoplatform/logger/api/logger";
pub const DEFAULT_LOGS_CHANNEL_NAME: &str = "sw-logs-channel";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NativePopupConfig {
    /// How long the page may stay hidden before that alone counts as an app switch.
    pub app_switch_dwell_ms: u64,
    /// Upper bound on waiting for `getInstalledRelatedApps` before `awaitRedirect`.
    pub installed_apps_timeout_ms: u64,
    pub logger_url: String,
    /// Native app ids to look for, per funding source.
    pub related_app_ids: HashMap<FundingSource, Vec<String>>,
    pub logs_channel_name: String,
}

impl Default for NativePopupConfig {
    fn default() -> Self {
        let mut related_app_ids = HashMap::new();
        related_app_ids.insert(
            FundingSource::Paypal,
            vec!["com.paypal.android.p2pmobile".to_string()],
        );
        related_app_ids.insert(
            FundingSource::Venmo,
            vec!["com.venmo".to_string(), "com.venmo.fifa".to_string()],
        );

        NativePopupConfig {
            app_switch_dwell_ms: DEFAULT_APP_SWITCH_DWELL_MS,
            installed_apps_timeout_ms: DEFAULT_INSTALLED_APPS_TIMEOUT_MS,
            logger_url: DEFAULT_LOGGER_URL.to_string(),
            related_app_ids,
            logs_channel_name: DEFAULT_LOGS_CHANNEL_NAME.to_string(),
        }
    }
}

impl NativePopupConfig {
    /// Read overrides from a JS object; `undefined`/`null` yields the defaults.
    pub fn from_js(value: JsValue) -> Result<Self, NativePopupError> {
        if value.is_undefined() || value.is_null() {
            return Ok(Self::default());
        }
        serde_wasm_bindgen::from_value(value).map_err(|err| NativePopupError::Config(err.to_string()))
    }

    pub fn app_switch_dwell(&self) -> Duration {
        Duration::from_millis(self.app_switch_dwell_ms)
    }

    pub fn installed_apps_timeout(&self) -> Duration {
        Duration::from_millis(self.installed_apps_timeout_ms)
    }

    pub fn app_ids_for(&self, funding_source: FundingSource) -> &[String] {
        self.related_app_ids
            .get(&funding_source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
