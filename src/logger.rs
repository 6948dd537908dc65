//! Structured event logger.
//!
//! Buffers `info`/`error` events and tracking records in memory and hands
//! them to a [`LogSink`] on `flush()`. Every event carries the session payload
//! (ids, env), every tracking record the session tracking fields (locale,
//! funding source). Events are mirrored to the `log` facade for local
//! debugging.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::session::SessionContext;

const MAX_BUFFERED: usize = 100;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Error,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct LogEvent {
    pub level: Level,
    pub event: String,
    pub payload: Map<String, Value>,
    pub timestamp: f64,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct LogBatch {
    pub events: Vec<LogEvent>,
    pub tracking: Vec<Map<String, Value>>,
}

impl LogBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.tracking.is_empty()
    }
}

/// Destination of flushed batches.
pub trait LogSink {
    fn deliver(&self, batch: LogBatch);
}

pub struct Logger {
    sink: Rc<dyn LogSink>,
    clock: fn() -> f64,
    payload: RefCell<Map<String, Value>>,
    tracking: RefCell<Map<String, Value>>,
    pending: RefCell<LogBatch>,
}

impl Logger {
    pub fn new(sink: Rc<dyn LogSink>, clock: fn() -> f64) -> Self {
        Logger {
            sink,
            clock,
            payload: RefCell::new(Map::new()),
            tracking: RefCell::new(Map::new()),
            pending: RefCell::new(LogBatch::default()),
        }
    }

    /// Logger preloaded with the session's payload and tracking fields.
    pub fn for_session(
        session: &SessionContext,
        referer: &str,
        sink: Rc<dyn LogSink>,
        clock: fn() -> f64,
    ) -> Self {
        let logger = Logger::new(sink, clock);
        logger.add_payload(json!({
            "referer": referer,
            "sessionID": session.session_id,
            "buttonSessionID": session.button_session_id,
            "sdkCorrelationID": session.sdk_correlation_id,
            "clientID": session.client_id,
            "env": session.env.as_str(),
        }));
        logger.add_tracking(json!({
            "client_id": session.client_id,
            "session_id": session.session_id,
            "referer": referer,
            "buyer_cntry": session.buyer_country,
            "locale": session.locale.tag(),
            "context_corrid": session.sdk_correlation_id,
            "chosen_funding": session.funding_source.as_str(),
        }));
        logger
    }

    /// Merge fields into every subsequent event payload.
    pub fn add_payload(&self, fields: Value) {
        merge(&mut self.payload.borrow_mut(), fields);
    }

    /// Merge fields into every subsequent tracking record.
    pub fn add_tracking(&self, fields: Value) {
        merge(&mut self.tracking.borrow_mut(), fields);
    }

    pub fn info(&self, event: &str, payload: Value) -> &Self {
        log::info!(target: "native_popup", "{} {}", event, payload);
        self.push(Level::Info, event, payload)
    }

    pub fn error(&self, event: &str, payload: Value) -> &Self {
        log::error!(target: "native_popup", "{} {}", event, payload);
        self.push(Level::Error, event, payload)
    }

    pub fn track(&self, fields: Value) -> &Self {
        let mut record = self.tracking.borrow().clone();
        merge(&mut record, fields);
        record.insert("t".to_string(), json!((self.clock)().to_string()));

        let full = {
            let mut pending = self.pending.borrow_mut();
            pending.tracking.push(record);
            pending.tracking.len() + pending.events.len() >= MAX_BUFFERED
        };
        if full {
            self.flush();
        }
        self
    }

    /// Deliver everything buffered so far. Empty flushes are skipped.
    pub fn flush(&self) {
        let batch = std::mem::take(&mut *self.pending.borrow_mut());
        if batch.is_empty() {
            return;
        }
        self.sink.deliver(batch);
    }

    fn push(&self, level: Level, event: &str, payload: Value) -> &Self {
        let mut merged = self.payload.borrow().clone();
        merge(&mut merged, payload);

        let full = {
            let mut pending = self.pending.borrow_mut();
            pending.events.push(LogEvent {
                level,
                event: event.to_string(),
                payload: merged,
                timestamp: (self.clock)(),
            });
            pending.tracking.len() + pending.events.len() >= MAX_BUFFERED
        };
        if full {
            self.flush();
        }
        self
    }
}

fn merge(target: &mut Map<String, Value>, fields: Value) {
    match fields {
        Value::Object(fields) => target.extend(fields),
        Value::Null => {}
        other => {
            target.insert("value".to_string(), other);
        }
    }
}

/// Sink that keeps delivered batches in memory.
#[derive(Default)]
pub struct MemorySink {
    batches: RefCell<Vec<LogBatch>>,
}

impl MemorySink {
    pub fn batches(&self) -> Vec<LogBatch> {
        self.batches.borrow().clone()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.batches
            .borrow()
            .iter()
            .flat_map(|batch| batch.events.iter().cloned())
            .collect()
    }
}

impl LogSink for MemorySink {
    fn deliver(&self, batch: LogBatch) {
        self.batches.borrow_mut().push(batch);
    }
}
