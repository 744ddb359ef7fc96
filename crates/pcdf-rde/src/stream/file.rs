use std::fmt::{Debug, Display, Formatter};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::Path;

use super::{EventStream, Events};
use crate::error::StreamError;
use crate::event::Event;

/// An [EventStream] decoding a PCDF recording, one event per line.
///
/// Blank lines are skipped. By default the recording is decoded completely on first access and replayed from memory
/// afterwards. The first decoding failure is remembered and reported on every later access.
/// A stream created with [single_use](FileEventStream::single_use) decodes lazily and can only be iterated once.
pub struct FileEventStream {
    reader: Option<Box<dyn BufRead>>,
    mode: Mode,
}

enum Mode {
    Caching {
        events: Option<Vec<Event>>,
        fault: Option<StreamError>,
    },
    SingleUse,
}

impl FileEventStream {
    /// Creates a caching stream reading from `reader`.
    pub fn new<R: BufRead + 'static>(reader: R) -> Self {
        FileEventStream {
            reader: Some(Box::new(reader)),
            mode: Mode::Caching {
                events: None,
                fault: None,
            },
        }
    }

    /// Creates a stream reading from `reader` that decodes while iterating and can be iterated only once.
    pub fn single_use<R: BufRead + 'static>(reader: R) -> Self {
        FileEventStream {
            reader: Some(Box::new(reader)),
            mode: Mode::SingleUse,
        }
    }

    /// Opens the recording at `path` as caching stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StreamError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }

    /// Opens the recording at `path` as single-use stream.
    pub fn open_single_use<P: AsRef<Path>>(path: P) -> Result<Self, StreamError> {
        let file = File::open(path)?;
        Ok(Self::single_use(BufReader::new(file)))
    }

    /// Decodes the whole recording if that has not happened yet.
    ///
    /// Does nothing for single-use streams.
    pub fn prepare(&mut self) -> Result<(), StreamError> {
        let Mode::Caching { events, fault } = &mut self.mode else {
            return Ok(());
        };
        if let Some(fault) = fault {
            return Err(fault.clone());
        }
        if events.is_some() {
            return Ok(());
        }
        let decoded = match self.reader.take() {
            Some(reader) => LineDecoder::new(reader).collect::<Result<Vec<_>, _>>(),
            None => Ok(Vec::new()),
        };
        match decoded {
            Ok(decoded) => {
                *events = Some(decoded);
                Ok(())
            },
            Err(e) => {
                *fault = Some(e.clone());
                Err(e)
            },
        }
    }

    /// The number of events, once a caching stream has been decoded successfully.
    pub fn event_count(&self) -> Option<usize> {
        match &self.mode {
            Mode::Caching { events: Some(events), .. } => Some(events.len()),
            _ => None,
        }
    }
}

impl EventStream for FileEventStream {
    fn events(&mut self) -> Events<'_> {
        if let Mode::SingleUse = self.mode {
            return match self.reader.take() {
                Some(reader) => Box::new(LineDecoder::new(reader)),
                None => Box::new(std::iter::once(Err(StreamError::Exhausted))),
            };
        }
        if let Err(e) = self.prepare() {
            return Box::new(std::iter::once(Err(e)));
        }
        match &self.mode {
            Mode::Caching { events: Some(events), .. } => Box::new(events.iter().cloned().map(Ok)),
            _ => Box::new(std::iter::empty()),
        }
    }
}

impl Debug for FileEventStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for FileEventStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.mode {
            Mode::Caching { fault: Some(fault), .. } => write!(f, "FileEventStream {{faulted: {}}}", fault),
            Mode::Caching { events: Some(events), .. } => write!(f, "FileEventStream {{{} events}}", events.len()),
            Mode::Caching { .. } => write!(f, "FileEventStream {{not decoded}}"),
            Mode::SingleUse if self.reader.is_some() => write!(f, "FileEventStream {{single-use}}"),
            Mode::SingleUse => write!(f, "FileEventStream {{single-use, consumed}}"),
        }
    }
}

/// Lazily decodes lines into events and stops after the first failure.
struct LineDecoder {
    lines: Lines<Box<dyn BufRead>>,
    line: usize,
    failed: bool,
}

impl LineDecoder {
    fn new(reader: Box<dyn BufRead>) -> Self {
        LineDecoder {
            lines: reader.lines(),
            line: 0,
            failed: false,
        }
    }

    fn decode(&self, text: io::Result<String>) -> Result<Event, StreamError> {
        Event::decode(&text?).map_err(|source| {
            StreamError::Decode {
                line: self.line,
                source,
            }
        })
    }
}

impl Iterator for LineDecoder {
    type Item = Result<Event, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let text = self.lines.next()?;
            self.line += 1;
            if matches!(&text, Ok(t) if t.trim().is_empty()) {
                continue;
            }
            let res = self.decode(text);
            self.failed = res.is_err();
            return Some(res);
        }
    }
}
