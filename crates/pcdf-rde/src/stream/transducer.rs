use std::fmt::{Debug, Formatter};

use super::{EventStream, Events};
use crate::error::StreamError;
use crate::event::Event;

/// An [EventStream] that is computed lazily from another one.
///
/// Transducers compose: the input of a transducer may itself be a transducer.
pub trait StreamTransducer: EventStream {
    /// The stream being transformed.
    type Input: EventStream;

    #[allow(missing_docs)]
    fn input(&self) -> &Self::Input;

    /// Drops the transformation and returns the underlying stream.
    fn into_input(self) -> Self::Input
    where
        Self: Sized;
}

/// Yields exactly those events of the input stream for which a predicate holds, in input order.
///
/// Errors of the input stream are passed on unfiltered.
pub struct StreamFilter<S, P> {
    input: S,
    predicate: P,
}

impl<S: EventStream, P: FnMut(&Event) -> bool> StreamFilter<S, P> {
    #[allow(missing_docs)]
    pub fn new(input: S, predicate: P) -> Self {
        StreamFilter { input, predicate }
    }

    /// Like [events](EventStream::events), but exposes the look-ahead of the filter.
    pub fn iter(&mut self) -> FilterIter<'_, P> {
        FilterIter {
            input: self.input.events(),
            predicate: &mut self.predicate,
            next: None,
        }
    }
}

impl<S: EventStream, P: FnMut(&Event) -> bool> EventStream for StreamFilter<S, P> {
    fn events(&mut self) -> Events<'_> {
        Box::new(self.iter())
    }
}

impl<S: EventStream, P: FnMut(&Event) -> bool> StreamTransducer for StreamFilter<S, P> {
    type Input = S;

    fn input(&self) -> &S {
        &self.input
    }

    fn into_input(self) -> S {
        self.input
    }
}

impl<S: Debug, P> Debug for StreamFilter<S, P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamFilter").field("input", &self.input).finish_non_exhaustive()
    }
}

/// The iterator of a [StreamFilter].
///
/// Never pulls more than one element ahead of the element it yields next.
pub struct FilterIter<'a, P> {
    input: Events<'a>,
    predicate: &'a mut P,
    next: Option<Result<Event, StreamError>>,
}

impl<P: FnMut(&Event) -> bool> FilterIter<'_, P> {
    /// Whether another element will be yielded; pulls from the input until a matching event or an error is found.
    pub fn has_next(&mut self) -> bool {
        if self.next.is_none() {
            self.next = self.pull();
        }
        self.next.is_some()
    }

    fn pull(&mut self) -> Option<Result<Event, StreamError>> {
        let predicate = &mut *self.predicate;
        self.input.find(|res| res.as_ref().map_or(true, |event| predicate(event)))
    }
}

impl<P: FnMut(&Event) -> bool> Iterator for FilterIter<'_, P> {
    type Item = Result<Event, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.take().or_else(|| self.pull())
    }
}

impl<P> Debug for FilterIter<'_, P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterIter").field("next", &self.next).finish_non_exhaustive()
    }
}

/// Wraps `input` into a filter removing NOx frames in which any sensor reports the invalid sentinel value.
pub fn invalid_nox_filter<S: EventStream>(input: S) -> StreamFilter<S, fn(&Event) -> bool> {
    fn is_valid(event: &Event) -> bool {
        !event.has_invalid_nox()
    }
    StreamFilter::new(input, is_valid as fn(&Event) -> bool)
}
