//! Rendering of tracing events into output streams.
//!
//! Two renderers are available:
//!
//! - **Structured**: one JSON object per line ([`JsonLayer`])
//! - **Colorized**: `tracing-subscriber`'s human formatter with ANSI colors,
//!   written through [`UnescapingWriter`]
//!
//! # Architecture
//!
//! ```text
//! tracing::Event -> LevelHandle (per-layer filter) -> JsonLayer ------------------> Destination
//!                                                  \-> fmt::Layer -> UnescapingWriter -> Destination
//! ```
//!
//! [`build`] picks one renderer from [`LogOptions`](crate::config::LogOptions);
//! [`initialize`] also installs it as the process default.

mod destination;
mod json;
mod tracing_init;
mod unescape;

pub use destination::{Destination, DestinationWriter, UnescapingMakeWriter, UnescapingWriter};
pub use json::JsonLayer;
pub use tracing_init::*;
pub use unescape::unescape_json_in_line;
