//! Output streams and the unescaping writer chained in front of them.

use std::{
    fmt,
    io::{self, IsTerminal, Write},
    sync::Arc,
};

use parking_lot::{Mutex, MutexGuard};
use tracing::Metadata;
use tracing_subscriber::fmt::MakeWriter;

use super::unescape::unescape_json_in_line;

/// Where rendered records are written.
///
/// Every record is written under a lock held for the whole line, so lines
/// from concurrent callers never interleave. The standard streams use their
/// own locks; custom writers are wrapped in a mutex.
#[derive(Clone, Default)]
pub enum Destination {
    Stdout,
    #[default]
    Stderr,
    Writer(Arc<Mutex<Box<dyn Write + Send>>>),
}

impl Destination {
    /// Wrap an arbitrary writer.
    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Destination::Writer(Arc::new(Mutex::new(Box::new(writer))))
    }

    /// Whether the destination is attached to an interactive terminal.
    ///
    /// Custom writers are never considered terminals.
    pub fn is_terminal(&self) -> bool {
        match self {
            Destination::Stdout => io::stdout().is_terminal(),
            Destination::Stderr => io::stderr().is_terminal(),
            Destination::Writer(_) => false,
        }
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Stdout => f.write_str("Stdout"),
            Destination::Stderr => f.write_str("Stderr"),
            Destination::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// Locked handle to a [`Destination`], alive for one record.
pub enum DestinationWriter<'a> {
    Stdout(io::StdoutLock<'static>),
    Stderr(io::StderrLock<'static>),
    Writer(MutexGuard<'a, Box<dyn Write + Send>>),
}

impl Write for DestinationWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            DestinationWriter::Stdout(w) => w.write(buf),
            DestinationWriter::Stderr(w) => w.write(buf),
            DestinationWriter::Writer(w) => w.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            DestinationWriter::Stdout(w) => w.write_all(buf),
            DestinationWriter::Stderr(w) => w.write_all(buf),
            DestinationWriter::Writer(w) => w.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            DestinationWriter::Stdout(w) => w.flush(),
            DestinationWriter::Stderr(w) => w.flush(),
            DestinationWriter::Writer(w) => w.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for Destination {
    type Writer = DestinationWriter<'a>;

    fn make_writer(&'a self) -> DestinationWriter<'a> {
        match self {
            Destination::Stdout => DestinationWriter::Stdout(io::stdout().lock()),
            Destination::Stderr => DestinationWriter::Stderr(io::stderr().lock()),
            Destination::Writer(writer) => DestinationWriter::Writer(writer.lock()),
        }
    }
}

/// Writer that unescapes embedded JSON text before forwarding each chunk.
///
/// Reports the caller's full byte count on success, even though the
/// forwarded buffer may be shorter.
pub struct UnescapingWriter<W> {
    inner: W,
}

impl<W: Write> UnescapingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for UnescapingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let processed = unescape_json_in_line(buf);
        self.inner.write_all(&processed)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// [`MakeWriter`] adapter producing [`UnescapingWriter`]s.
#[derive(Debug, Clone)]
pub struct UnescapingMakeWriter<M> {
    inner: M,
}

impl<M> UnescapingMakeWriter<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for UnescapingMakeWriter<M> {
    type Writer = UnescapingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        UnescapingWriter::new(self.inner.make_writer())
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        UnescapingWriter::new(self.inner.make_writer_for(meta))
    }
}
