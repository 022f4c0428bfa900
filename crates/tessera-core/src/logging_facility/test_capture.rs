//! In-memory event capture for logging assertions
//!
//! Events are stored as flat field maps keyed by the names in
//! `tessera_core_types::schema`. Many tests share one global subscriber, so
//! assertions usually narrow by operation and by request id first.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tessera_core_types::schema::{
    FIELD_AFFECTED_ROWS, FIELD_ERR_CODE, FIELD_EVENT, FIELD_OP, FIELD_REQUEST_ID,
};
use tessera_core_types::RequestId;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// One recorded event
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    pub level: Level,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn op(&self) -> Option<&str> {
        self.field(FIELD_OP)
    }

    pub fn event(&self) -> Option<&str> {
        self.field(FIELD_EVENT)
    }

    pub fn err_code(&self) -> Option<&str> {
        self.field(FIELD_ERR_CODE)
    }

    pub fn affected_rows(&self) -> Option<u64> {
        self.field(FIELD_AFFECTED_ROWS)?.parse().ok()
    }

    pub fn belongs_to(&self, request_id: &RequestId) -> bool {
        self.field(FIELD_REQUEST_ID) == Some(request_id.as_str())
    }

    /// `op` and `event` both match
    pub fn is(&self, op: &str, event: &str) -> bool {
        self.op() == Some(op) && self.event() == Some(event)
    }
}

struct Fields(BTreeMap<String, String>);

impl Visit for Fields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
}

type Sink = Arc<Mutex<Vec<CapturedEvent>>>;

fn sink(events: &Sink) -> MutexGuard<'_, Vec<CapturedEvent>> {
    events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct CaptureLayer {
    events: Sink,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields(BTreeMap::new());
        event.record(&mut fields);
        sink(&self.events).push(CapturedEvent {
            level: *event.metadata().level(),
            fields: fields.0,
        });
    }
}

/// Read side of the capture
#[derive(Clone, Default)]
pub struct TestCapture {
    events: Sink,
}

impl TestCapture {
    pub fn events(&self) -> Vec<CapturedEvent> {
        sink(&self.events).clone()
    }

    /// Events logged by one operation, in emission order
    pub fn for_op(&self, op: &str) -> Vec<CapturedEvent> {
        self.select(|e| e.op() == Some(op))
    }

    /// Events carrying one request's correlation id, in emission order
    pub fn for_request(&self, request_id: &RequestId) -> Vec<CapturedEvent> {
        self.select(|e| e.belongs_to(request_id))
    }

    /// Number of `event` events for `op` logged under `request_id`
    pub fn count(&self, request_id: &RequestId, op: &str, event: &str) -> usize {
        sink(&self.events)
            .iter()
            .filter(|e| e.belongs_to(request_id) && e.is(op, event))
            .count()
    }

    /// Error codes reported by `op`, in emission order
    pub fn error_codes(&self, op: &str) -> Vec<String> {
        sink(&self.events)
            .iter()
            .filter(|e| e.op() == Some(op))
            .filter_map(|e| e.err_code().map(str::to_string))
            .collect()
    }

    pub fn select<F>(&self, predicate: F) -> Vec<CapturedEvent>
    where
        F: Fn(&CapturedEvent) -> bool,
    {
        sink(&self.events)
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    /// # Panics
    ///
    /// Panics when no `event` was logged for `op`.
    pub fn assert_logged(&self, op: &str, event: &str) {
        let events = sink(&self.events);
        assert!(
            events.iter().any(|e| e.is(op, event)),
            "no {} event logged for {} among {} captured",
            event,
            op,
            events.len()
        );
    }

    fn push(&self, event: CapturedEvent) {
        sink(&self.events).push(event);
    }
}

static GLOBAL_CAPTURE: OnceLock<TestCapture> = OnceLock::new();

/// Install the capture as the global subscriber on first call
///
/// Later calls return the same capture.
///
/// ```
/// use tessera_core::logging_facility::test_capture::init_test_capture;
/// use tessera_core::log_op_start;
///
/// let capture = init_test_capture();
/// log_op_start!("next_position");
/// capture.assert_logged("next_position", "start");
/// ```
pub fn init_test_capture() -> TestCapture {
    GLOBAL_CAPTURE
        .get_or_init(|| {
            let capture = TestCapture::default();
            let layer = CaptureLayer {
                events: capture.events.clone(),
            };
            // Another subscriber may already own the process in doc tests
            let _ = tracing_subscriber::registry().with(layer).try_init();
            capture
        })
        .clone()
}
