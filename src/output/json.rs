//! Structured (JSON-per-line) renderer.
//!
//! # Format
//!
//! ```text
//! {"time":"2026-01-21T14:13:48.123+00:00","level":"INFO","msg":"request served","source":{"module":"app::http","file":"src/http.rs","line":42},"component":"api","status":200}
//! ```
//!
//! Keys appear in a fixed order: `time`, `level`, `msg`, `source` (when
//! caller capture is on), then fields of the enclosing spans from the root
//! outwards, then the event's own fields in call order.
//!
//! Attributes never replace the layer's own keys: an attribute named `time`,
//! `level`, `msg` or `source` is written as `fields.<name>`. A span field and
//! an event field with the same name are both written, span first.
//!
//! A string field whose text starts with `{` or `[` and parses as JSON is
//! embedded as a JSON value instead of an escaped string, so payloads that are
//! already JSON are not encoded twice.

use std::{fmt::Write as FmtWrite, io::Write};

use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::{Map, Number, Value};
use tracing::{
    Event, Id, Subscriber,
    field::{Field, Visit},
    span::{Attributes, Record},
};
use tracing_subscriber::{
    Layer,
    fmt::MakeWriter,
    layer::Context,
    registry::LookupSpan,
};

use crate::{config::DEFAULT_TIME_FORMAT, level::Level};

/// A tracing layer that writes one JSON object per event.
pub struct JsonLayer<W> {
    make_writer: W,
    time_format: String,
    caller: bool,
    parse_json_strings: bool,
}

impl<W> JsonLayer<W>
where
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    pub fn new(make_writer: W) -> Self {
        Self {
            make_writer,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            caller: true,
            parse_json_strings: true,
        }
    }

    /// chrono `strftime` layout for the `time` key. Must already be validated.
    pub fn with_time_format(mut self, time_format: impl Into<String>) -> Self {
        self.time_format = time_format.into();
        self
    }

    pub fn with_caller(mut self, caller: bool) -> Self {
        self.caller = caller;
        self
    }

    pub fn with_parse_json_strings(mut self, parse: bool) -> Self {
        self.parse_json_strings = parse;
        self
    }

    fn format_event<S>(&self, event: &Event<'_>, ctx: &Context<'_, S>) -> Option<String>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let metadata = event.metadata();

        let mut visitor = JsonVisitor::new(self.parse_json_strings);
        event.record(&mut visitor);

        let mut record: Vec<(String, Value)> = Vec::new();
        record.push(("time".into(), Value::String(format_time(&self.time_format))));
        record.push((
            "level".into(),
            Value::String(
                Level::from_tracing(metadata.level())
                    .map_or("TRACE", |level| level.as_str())
                    .to_string(),
            ),
        ));
        record.push((
            "msg".into(),
            Value::String(visitor.message.take().unwrap_or_default()),
        ));

        if self.caller {
            let mut source = Map::new();
            if let Some(module) = metadata.module_path() {
                source.insert("module".into(), Value::String(module.to_string()));
            }
            if let Some(file) = metadata.file() {
                source.insert("file".into(), Value::String(file.to_string()));
            }
            if let Some(line) = metadata.line() {
                source.insert("line".into(), Value::Number(line.into()));
            }
            record.push(("source".into(), Value::Object(source)));
        }

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    for (key, value) in &fields.0 {
                        record.push((attribute_key(key), value.clone()));
                    }
                }
            }
        }

        for (key, value) in visitor.fields {
            record.push((attribute_key(&key), value));
        }

        let mut line = serde_json::to_string(&Entries(&record)).ok()?;
        line.push('\n');
        Some(line)
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = JsonVisitor::new(self.parse_json_strings);
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanFields(visitor.fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = JsonVisitor::new(self.parse_json_strings);
        values.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanFields>() {
            Some(fields) => fields.merge(visitor.fields),
            None => extensions.insert(SpanFields(visitor.fields)),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(line) = self.format_event(event, &ctx) else {
            return;
        };

        // Write errors cannot be surfaced from inside a layer.
        let mut writer = self.make_writer.make_writer_for(event.metadata());
        let _ = writer.write_all(line.as_bytes());
    }
}

/// Keys written by the layer itself.
const RESERVED_KEYS: [&str; 4] = ["time", "level", "msg", "source"];

/// Attribute key as written. Attributes named like a reserved key are
/// moved under a `fields.` prefix so they cannot shadow the record's own.
fn attribute_key(key: &str) -> String {
    if RESERVED_KEYS.contains(&key) {
        format!("fields.{key}")
    } else {
        key.to_string()
    }
}

/// Ordered object entries. Repeated keys are all written, in order.
struct Entries<'a>(&'a [(String, Value)]);

impl Serialize for Entries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Fields recorded on a span, stored in the span's extensions.
struct SpanFields(Vec<(String, Value)>);

impl SpanFields {
    fn merge(&mut self, updates: Vec<(String, Value)>) {
        for (key, value) in updates {
            match self.0.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => self.0.push((key, value)),
            }
        }
    }
}

fn format_time(layout: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", chrono::Local::now().format(layout)).is_err() {
        out.clear();
    }
    out
}

/// Whether `text` should be embedded as JSON rather than quoted.
fn embedded_json(text: &str) -> Option<Value> {
    if !text.starts_with(['{', '[']) {
        return None;
    }
    serde_json::from_str(text).ok()
}

/// Visitor that collects event or span fields in call order.
struct JsonVisitor {
    message: Option<String>,
    fields: Vec<(String, Value)>,
    parse_json_strings: bool,
}

impl JsonVisitor {
    fn new(parse_json_strings: bool) -> Self {
        Self {
            message: None,
            fields: Vec::new(),
            parse_json_strings,
        }
    }

    fn push(&mut self, field: &Field, value: Value) {
        self.fields.push((field.name().to_string(), value));
    }

    fn push_text(&mut self, field: &Field, text: String) {
        if field.name() == "message" {
            self.message = Some(text);
            return;
        }

        let value = if self.parse_json_strings {
            embedded_json(&text).unwrap_or(Value::String(text))
        } else {
            Value::String(text)
        };
        self.push(field, value);
    }
}

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push_text(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push_text(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.push(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, Value::String(value.to_string()));
    }
}
