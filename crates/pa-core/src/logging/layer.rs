//! JSONL tracing layer.
//!
//! Each event becomes one line:
//!
//! ```text
//! {"ts":"...","level":"info","event":"stream.progress","target":"pa_core::stream",
//!  "run_id":"run-1f2e3d4c5b6a","stage":"stream","message":"edges processed",
//!  "fields":{"records":100000,"rank_queries":99120}}
//! ```
//!
//! `event`, `run_id`, `stage` and `message` are lifted out of the event's
//! fields; `event` falls back to the target when absent.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

#[derive(Default)]
struct Collected {
    event: Option<String>,
    run_id: Option<String>,
    stage: Option<String>,
    message: Option<String>,
    fields: Map<String, Value>,
}

impl Collected {
    fn put(&mut self, field: &Field, value: Value) {
        let slot = match field.name() {
            "event" => &mut self.event,
            "run_id" => &mut self.run_id,
            "stage" => &mut self.stage,
            "message" => &mut self.message,
            name => {
                self.fields.insert(name.to_string(), value);
                return;
            }
        };
        *slot = Some(match value {
            Value::String(s) => s,
            other => other.to_string(),
        });
    }
}

impl Visit for Collected {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, Value::from(format!("{:?}", value)));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON form
        self.put(field, serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::from(value));
    }
}

#[derive(Serialize)]
struct Line<'a> {
    ts: String,
    level: String,
    event: &'a str,
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "no_fields")]
    fields: &'a Map<String, Value>,
}

fn no_fields(fields: &&Map<String, Value>) -> bool {
    fields.is_empty()
}

/// Writes every event as a JSON object on its own line.
pub struct JsonlLayer<W = io::Stderr> {
    out: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> JsonlLayer<W> {
    pub fn new(out: W) -> Self {
        JsonlLayer {
            out: Mutex::new(out),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber,
    W: Write + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut collected = Collected::default();
        event.record(&mut collected);
        let meta = event.metadata();

        let line = Line {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level: meta.level().as_str().to_ascii_lowercase(),
            event: collected.event.as_deref().unwrap_or(meta.target()),
            target: meta.target(),
            run_id: collected.run_id.as_deref(),
            stage: collected.stage.as_deref(),
            message: collected.message.as_deref(),
            fields: &collected.fields,
        };
        let Ok(mut text) = serde_json::to_vec(&line) else {
            return;
        };
        text.push(b'\n');
        if let Ok(mut out) = self.out.lock() {
            let _ = out.write_all(&text);
        }
    }
}
