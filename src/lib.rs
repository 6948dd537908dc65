//! Native popup / app-switch coordination for the hosted payment button.
//!
//! The popup window asks its opener where to send the buyer, navigates to
//! the native app, watches for the app switch and reports the first return
//! fragment back to the opener as the flow's outcome.

mod bindings;
mod browser;
mod client;
mod components;
mod config;
mod coordinator;
mod detector;
mod error;
mod interop;
mod log_relay;
mod logger;
mod messenger;
mod outcome;
mod popup;
mod popup_component;
mod session;
mod subscription;

#[cfg(test)]
mod test_support;

pub use browser::*;
pub use client::*;
pub use components::*;
pub use config::*;
pub use coordinator::*;
pub use detector::*;
pub use error::*;
pub use interop::*;
pub use log_relay::*;
pub use logger::*;
pub use messenger::*;
pub use outcome::*;
pub use popup::*;
pub use popup_component::*;
pub use session::*;
pub use subscription::*;
