//! Log-record shaping on top of `tracing`.
//!
//! - [`filter`] redacts record values by per-field tags and a nil policy
//!   before they are logged.
//! - [`output`] renders events as JSON lines or colorized text, gated by a
//!   [`LevelHandle`] that can be changed while the process runs.
//! - [`unescape_json_in_line`] repairs JSON text that the colorized renderer
//!   escaped, leaving ANSI color sequences alone.
//!
//! ```no_run
//! use logshape::{LogOptions, initialize};
//!
//! let level = initialize(&LogOptions::default())?;
//! tracing::info!(payload = r#"{"id":1}"#, "started");
//!
//! level.set_level("debug")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod adapter;
pub mod config;
pub mod filter;
pub mod level;
pub mod output;

#[cfg(test)]
mod tests;

pub use adapter::{Adapter, Noop, TracingAdapter};
pub use config::{ConfigError, LogOptions, PrettyMode};
pub use filter::{FilterPolicy, Filtered, LogValue, Loggable, Verbatim, filter};
pub use level::{Level, LevelHandle, ParseLevelError};
pub use output::{
    Destination, JsonLayer, Logging, LoggingError, build, build_from_toml, initialize,
    unescape_json_in_line,
};
