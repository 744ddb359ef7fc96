//! Destinations for the events produced by an analysis.

use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::Path;

use jsonl::WriteError;

use crate::event::Event;

/// An append-only, line oriented destination for events.
pub trait OutputSink {
    /// Appends `event` as one line.
    fn append(&mut self, event: &Event) -> io::Result<()>;

    /// Makes sure everything appended so far reached the destination.
    fn flush(&mut self) -> io::Result<()>;
}

/// Writes every event as one JSON line to a writer.
#[derive(Debug)]
pub struct LineSink<W: Write> {
    writer: W,
}

impl<W: Write> LineSink<W> {
    #[allow(missing_docs)]
    pub fn new(writer: W) -> Self {
        LineSink { writer }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl LineSink<BufWriter<File>> {
    /// Creates the file at `path`, replacing an existing one.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> OutputSink for LineSink<W> {
    fn append(&mut self, event: &Event) -> io::Result<()> {
        match jsonl::write(&mut self.writer, event) {
            Ok(()) => Ok(()),
            Err(WriteError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::new(ErrorKind::InvalidData, format!("{:?}", e))),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl OutputSink for Vec<Event> {
    fn append(&mut self, event: &Event) -> io::Result<()> {
        self.push(event.clone());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn append(&mut self, event: &Event) -> io::Result<()> {
        (**self).append(event)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}
