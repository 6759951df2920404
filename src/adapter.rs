//! Minimal logging facade for libraries that must not pick a logger.

use serde_json::{Map, Value};

use crate::filter::{Loggable, verbatim};

/// Key/value pairs attached to an adapter call.
pub type Fields<'a> = &'a [(&'a str, &'a dyn Loggable)];

/// Leveled logging sink with key/value context.
pub trait Adapter: Send + Sync {
    fn error(&self, msg: &str, fields: Fields<'_>);
    fn info(&self, msg: &str, fields: Fields<'_>);
    fn debug(&self, msg: &str, fields: Fields<'_>);
    fn warn(&self, msg: &str, fields: Fields<'_>);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl Adapter for Noop {
    fn error(&self, _msg: &str, _fields: Fields<'_>) {}
    fn info(&self, _msg: &str, _fields: Fields<'_>) {}
    fn debug(&self, _msg: &str, _fields: Fields<'_>) {}
    fn warn(&self, _msg: &str, _fields: Fields<'_>) {}
}

/// Forwards into `tracing`, with the pairs encoded as one JSON `attrs` field.
///
/// Events are emitted from this module, so their caller location (`source`
/// in JSON output, file and line in pretty output) names `adapter.rs`, not
/// the code that called the adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAdapter;

fn encode(fields: Fields<'_>) -> Option<String> {
    if fields.is_empty() {
        return None;
    }

    let attrs: Map<String, Value> = fields
        .iter()
        .map(|(key, value)| ((*key).to_string(), verbatim(*value)))
        .collect();
    Some(Value::Object(attrs).to_string())
}

macro_rules! forward {
    ($name:ident, $macro:ident) => {
        fn $name(&self, msg: &str, fields: Fields<'_>) {
            match encode(fields) {
                Some(attrs) => tracing::$macro!(attrs = %attrs, "{}", msg),
                None => tracing::$macro!("{}", msg),
            }
        }
    };
}

impl Adapter for TracingAdapter {
    forward!(error, error);
    forward!(info, info);
    forward!(debug, debug);
    forward!(warn, warn);
}
