//! Request/response relay for service-worker logs.
//!
//! The page asks the service worker for its buffered logs over a shared
//! channel. Each request carries a fresh correlation id and only the response
//! echoing that id resolves it, so two pages (or two requests) sharing the
//! channel never receive each other's logs. The relay is an ordinary value
//! passed by reference; there is no process-wide channel.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::logger::Logger;

pub const GET_SW_LOGS: &str = "GET_SW_LOGS";
pub const GET_SW_LOGS_RESPONSE: &str = "GET_SW_LOGS_RESPONSE";
pub const SW_LOGS_EVENT: &str = "SERVICE_WORKER_LOGS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("log channel rejected request: {0}")]
    Post(String),

    #[error("log request {0} was dropped before a response arrived")]
    Dropped(u64),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub correlation_id: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub event_name: String,
    pub correlation_id: u64,
    #[serde(default)]
    pub payload: Vec<Value>,
}

/// Outbound half of the channel (e.g. a `BroadcastChannel`).
pub trait RelayTransport {
    fn post(&self, request: &RelayRequest) -> Result<(), String>;
}

pub struct LogRelay {
    transport: Rc<dyn RelayTransport>,
    next_id: Cell<u64>,
    pending: RefCell<HashMap<u64, oneshot::Sender<Vec<Value>>>>,
}

impl LogRelay {
    pub fn new(transport: Rc<dyn RelayTransport>) -> Self {
        LogRelay {
            transport,
            next_id: Cell::new(1),
            pending: RefCell::new(HashMap::new()),
        }
    }

    /// Post a log request and wait for its correlated response.
    pub fn request_logs(&self) -> LocalBoxFuture<'static, Result<Vec<Value>, RelayError>> {
        let correlation_id = self.next_id.get();
        self.next_id.set(correlation_id + 1);

        let (sender, receiver) = oneshot::channel();
        {
            let mut pending = self.pending.borrow_mut();
            // Requests whose future was dropped will never be awaited.
            pending.retain(|_, sender| !sender.is_canceled());
            pending.insert(correlation_id, sender);
        }

        let request = RelayRequest {
            kind: GET_SW_LOGS.to_string(),
            correlation_id,
        };
        if let Err(err) = self.transport.post(&request) {
            self.pending.borrow_mut().remove(&correlation_id);
            return async move { Err(RelayError::Post(err)) }.boxed_local();
        }

        async move {
            receiver
                .await
                .map_err(|_| RelayError::Dropped(correlation_id))
        }
        .boxed_local()
    }

    /// Route an inbound channel message. Returns whether it resolved a request.
    pub fn handle_message(&self, data: Value) -> bool {
        let response: RelayResponse = match serde_json::from_value(data) {
            Ok(response) => response,
            Err(_) => return false,
        };
        if response.event_name != GET_SW_LOGS_RESPONSE {
            return false;
        }

        let sender = self.pending.borrow_mut().remove(&response.correlation_id);
        match sender {
            Some(sender) => sender.send(response.payload).is_ok(),
            None => {
                log::debug!(
                    target: "native_popup",
                    "dropping log response for unknown request {}",
                    response.correlation_id
                );
                false
            }
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.borrow().len()
    }
}

/// Request service-worker logs and forward them to the logger.
pub async fn forward_logs(relay: Rc<LogRelay>, logger: Rc<Logger>) -> Result<usize, RelayError> {
    let logs = relay.request_logs().await?;
    let count = logs.len();
    let serialized = serde_json::to_string(&logs).unwrap_or_default();
    logger.info(SW_LOGS_EVENT, json!({ "logs": serialized })).flush();
    Ok(count)
}
