//! Subscriber construction: picks the colorized or structured renderer and
//! wires both to a shared, live-mutable level threshold.

use chrono::format::{Item, StrftimeItems};
use tracing_subscriber::{
    Layer, Registry,
    fmt::time::ChronoLocal,
    layer::{Layered, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
};

use super::{JsonLayer, UnescapingMakeWriter};
use crate::{
    config::{ConfigError, LogOptions},
    level::LevelHandle,
};

/// Type-erased renderer layer, already filtered by the level threshold.
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// A configured renderer, ready to be installed.
pub struct Logging {
    layer: BoxedLayer,
    level: LevelHandle,
    pretty: bool,
}

impl Logging {
    /// Handle controlling the threshold of this renderer.
    pub fn level_handle(&self) -> LevelHandle {
        self.level.clone()
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    /// Subscriber for scoped use with [`tracing::subscriber::with_default`].
    pub fn subscriber(self) -> Layered<BoxedLayer, Registry> {
        tracing_subscriber::registry().with(self.layer)
    }

    /// Install as the process-wide default subscriber.
    pub fn init(self) -> Result<LevelHandle, LoggingError> {
        let level = self.level.clone();
        let mode = if self.pretty { "pretty" } else { "json" };

        self.subscriber().try_init()?;

        tracing::debug!(mode, level = %level.get(), "logging initialized");
        Ok(level)
    }
}

/// Build the renderer selected by `options`.
///
/// Pretty output goes through `tracing-subscriber`'s formatter with colors
/// always on; structured output goes through [`JsonLayer`].
pub fn build(options: &LogOptions) -> Result<Logging, LoggingError> {
    let pretty = options.resolve_pretty();
    let level = LevelHandle::new(options.resolve_level());

    let time_format = options.resolve_time_format(pretty);
    validate_time_format(time_format)?;

    let layer = if pretty {
        pretty_layer(options, time_format.to_string(), &level)
    } else {
        JsonLayer::new(options.destination.clone())
            .with_time_format(time_format)
            .with_caller(options.caller)
            .with_parse_json_strings(options.parse_json_strings)
            .with_filter(level.clone())
            .boxed()
    };

    Ok(Logging {
        layer,
        level,
        pretty,
    })
}

/// Build from a TOML options document.
pub fn build_from_toml(source: &str) -> Result<Logging, LoggingError> {
    build(&LogOptions::from_toml_str(source)?)
}

/// Build and install in one step.
pub fn initialize(options: &LogOptions) -> Result<LevelHandle, LoggingError> {
    build(options)?.init()
}

fn pretty_layer(options: &LogOptions, time_format: String, level: &LevelHandle) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_timer(ChronoLocal::new(time_format))
        .with_target(false)
        .with_file(options.caller)
        .with_line_number(options.caller);

    // The formatter Debug-quotes string fields; the unescaping writer restores
    // any that hold JSON text.
    if options.parse_json_strings {
        layer
            .with_writer(UnescapingMakeWriter::new(options.destination.clone()))
            .with_filter(level.clone())
            .boxed()
    } else {
        layer
            .with_writer(options.destination.clone())
            .with_filter(level.clone())
            .boxed()
    }
}

fn validate_time_format(layout: &str) -> Result<(), LoggingError> {
    if StrftimeItems::new(layout).any(|item| matches!(item, Item::Error)) {
        return Err(LoggingError::InvalidTimeFormat(layout.to_string()));
    }
    Ok(())
}

/// Logging setup errors.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid time format: {0:?}")]
    InvalidTimeFormat(String),

    #[error("failed to install logging subscriber: {0}")]
    Install(#[from] TryInitError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
