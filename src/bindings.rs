//! Low-level wasm-bindgen bindings to the page globals the popup talks to.
//!
//! Higher-level wrappers live in `client.rs`.

use wasm_bindgen::prelude::*;
use web_sys::js_sys::Promise;

#[wasm_bindgen]
extern "C" {
    //------------------------------------------------------------------------------
    // Cross-window messaging
    //------------------------------------------------------------------------------

    /// `paypal.postRobot.send(win, event, payload, { domain })` → `Promise<{ source, origin, data }>`
    ///
    /// Throws synchronously when the messaging bridge is not loaded.
    #[wasm_bindgen(catch, js_namespace = ["paypal", "postRobot"], js_name = send)]
    pub fn post_robot_send(
        win: &JsValue,
        event: &str,
        payload: JsValue,
        options: JsValue,
    ) -> Result<Promise, JsValue>;

    //------------------------------------------------------------------------------
    // Installed related apps
    //------------------------------------------------------------------------------

    /// `navigator` as seen by the feature-detected related-apps query.
    #[wasm_bindgen(js_name = Navigator)]
    #[derive(Debug, Clone)]
    pub type RelatedAppsNavigator;

    /// `navigator.getInstalledRelatedApps()` → `Promise<Array<{ id, platform, version }>>`
    #[wasm_bindgen(method, catch, js_name = getInstalledRelatedApps)]
    pub fn get_installed_related_apps(this: &RelatedAppsNavigator) -> Result<Promise, JsValue>;
}
