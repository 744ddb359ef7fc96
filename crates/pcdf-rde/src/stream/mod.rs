//! Event streams feeding the analyser.
//!
//! An [EventStream] hands out its events lazily as an iterator of results.
//! [FileEventStream] decodes a PCDF recording, [StreamFilter] removes events from another stream without
//! materializing it.

use std::fmt::Debug;

use crate::error::StreamError;
use crate::event::Event;

mod file;
mod transducer;

pub use self::file::FileEventStream;
pub use self::transducer::{invalid_nox_filter, FilterIter, StreamFilter, StreamTransducer};

/// The iterator handed out by [EventStream::events].
pub type Events<'a> = Box<dyn Iterator<Item = Result<Event, StreamError>> + 'a>;

/// A finite, ordered sequence of decoded events.
///
/// Depending on the implementation, the sequence can be replayed by calling [events](EventStream::events) again.
/// A stream that cannot be replayed reports [StreamError::Exhausted] on the second call.
pub trait EventStream: Debug {
    /// Returns the events of the stream in order.
    ///
    /// An error terminates the iteration; it is always the last item.
    fn events(&mut self) -> Events<'_>;

    /// Returns the consecutive pairs of events of the stream, i.e. `n - 1` pairs for `n` events.
    fn pairs(&mut self) -> Pairs<'_> {
        Pairs {
            events: self.events(),
            previous: None,
        }
    }

    /// Wraps the stream into a [StreamFilter] that only yields the events matching `predicate`.
    fn filtered<P>(self, predicate: P) -> StreamFilter<Self, P>
    where
        Self: Sized,
        P: FnMut(&Event) -> bool,
    {
        StreamFilter::new(self, predicate)
    }
}

impl<S: EventStream + ?Sized> EventStream for Box<S> {
    fn events(&mut self) -> Events<'_> {
        (**self).events()
    }
}

/// Two events directly following each other in a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPair {
    #[allow(missing_docs)]
    pub first: Event,
    #[allow(missing_docs)]
    pub second: Event,
}

/// Iterator over the consecutive pairs of an [EventStream].
pub struct Pairs<'a> {
    events: Events<'a>,
    previous: Option<Event>,
}

impl Debug for Pairs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pairs").field("previous", &self.previous).finish_non_exhaustive()
    }
}

impl Iterator for Pairs<'_> {
    type Item = Result<EventPair, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let second = match self.events.next()? {
                Ok(event) => event,
                Err(e) => return Some(Err(e)),
            };
            match self.previous.replace(second.clone()) {
                Some(first) => return Some(Ok(EventPair { first, second })),
                None => continue,
            }
        }
    }
}
