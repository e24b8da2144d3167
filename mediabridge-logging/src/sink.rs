//! Foreign log sinks
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use parking_lot::Mutex;
use std::cell::Cell;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Severity of a message delivered to a foreign sink
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Could not assign a severity level
    Unknown = -1,
    Verbose = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
    /// Disables a sink; never attached to a message
    None = 5,
}

impl Severity {
    /// Convert a raw value received over the ABI
    pub fn from_raw(value: i32) -> Option<Severity> {
        match value {
            -1 => Some(Severity::Unknown),
            1 => Some(Severity::Verbose),
            2 => Some(Severity::Info),
            3 => Some(Severity::Warning),
            4 => Some(Severity::Error),
            5 => Some(Severity::None),
            _ => None,
        }
    }

    fn from_level(level: &Level) -> Severity {
        match *level {
            Level::TRACE | Level::DEBUG => Severity::Verbose,
            Level::INFO => Severity::Info,
            Level::WARN => Severity::Warning,
            Level::ERROR => Severity::Error,
        }
    }
}

/// Identifier of a registered sink, never zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

impl SinkId {
    pub fn as_raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Option<SinkId> {
        (raw != 0).then_some(SinkId(raw))
    }
}

type SinkHandler = Arc<dyn Fn(Severity, &str) + Send + Sync>;

struct RegisteredSink {
    id: SinkId,
    min_severity: Severity,
    handler: SinkHandler,
}

static SINKS: Mutex<Vec<RegisteredSink>> = Mutex::new(Vec::new());
static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static IN_SINK: Cell<bool> = const { Cell::new(false) };
}

/// Register a sink receiving every message at or above `min_severity`
///
/// Returns `None` when `min_severity` is [`Severity::None`], since such a
/// sink would never receive anything.
pub fn add_sink<F>(min_severity: Severity, handler: F) -> Option<SinkId>
where
    F: Fn(Severity, &str) + Send + Sync + 'static,
{
    if min_severity == Severity::None {
        return None;
    }
    let id = SinkId(NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed));
    SINKS.lock().push(RegisteredSink {
        id,
        min_severity,
        handler: Arc::new(handler),
    });
    Some(id)
}

/// Remove a sink. Unknown ids are ignored.
pub fn remove_sink(id: SinkId) -> bool {
    let mut sinks = SINKS.lock();
    let before = sinks.len();
    sinks.retain(|sink| sink.id != id);
    sinks.len() != before
}

/// Number of currently registered sinks
pub fn sink_count() -> usize {
    SINKS.lock().len()
}

/// Log a message on behalf of the host
pub fn log_message(severity: Severity, message: &str) {
    match severity {
        Severity::Verbose => tracing::debug!(target: "mediabridge::host", "{}", message),
        Severity::Info => tracing::info!(target: "mediabridge::host", "{}", message),
        Severity::Warning => tracing::warn!(target: "mediabridge::host", "{}", message),
        Severity::Error => tracing::error!(target: "mediabridge::host", "{}", message),
        Severity::Unknown | Severity::None => {}
    }
}

fn dispatch(severity: Severity, message: &str) {
    let handlers: Vec<SinkHandler> = {
        let sinks = SINKS.lock();
        sinks
            .iter()
            .filter(|sink| severity >= sink.min_severity)
            .map(|sink| Arc::clone(&sink.handler))
            .collect()
    };
    if handlers.is_empty() {
        return;
    }

    // A sink logging from inside its own callback would recurse forever.
    if IN_SINK.with(|flag| flag.replace(true)) {
        return;
    }
    for handler in handlers {
        handler(severity, message);
    }
    IN_SINK.with(|flag| flag.set(false));
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Layer forwarding events to the registered foreign sinks
#[derive(Debug, Default)]
pub struct ForeignSinkLayer;

impl<S: Subscriber> Layer<S> for ForeignSinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let severity = Severity::from_level(event.metadata().level());
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        visitor.message.push_str(&visitor.fields);
        dispatch(severity, &visitor.message);
    }
}
