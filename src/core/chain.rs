use crate::core::probe::StageCounts;
use crate::utils::error::{BoxError, ChainError, Result};
use std::cell::{Cell, Ref, RefCell};
use std::convert::Infallible;
use std::iter::FusedIterator;
use std::rc::Rc;

/// The iterator a pipeline stage produces: values, or failures travelling as items.
pub type Stream<'a, T> = Box<dyn Iterator<Item = Result<T>> + 'a>;

/// Receives a recoverable failure and the raw source element that led to it.
pub type ErrorHandler<'a, S> = Box<dyn FnMut(&ChainError, Option<&S>) -> anyhow::Result<()> + 'a>;

struct CursorSlot<S> {
    recorder: Cell<Option<fn(&S) -> S>>,
    last: RefCell<Option<S>>,
}

/// The most recently pulled raw source element.
///
/// Recording only happens once the cursor is armed, so pipelines without an
/// error handler never clone their source elements and need not be `Clone`.
pub(crate) struct Cursor<S>(Rc<CursorSlot<S>>);

impl<S> Cursor<S> {
    pub(crate) fn arm(&self)
    where
        S: Clone,
    {
        self.0.recorder.set(Some(S::clone as fn(&S) -> S));
    }

    pub(crate) fn record(&self, value: &S) {
        if let Some(clone) = self.0.recorder.get() {
            self.replace(Some(clone(value)));
        }
    }

    pub(crate) fn replace(&self, value: Option<S>) {
        *self.0.last.borrow_mut() = value;
    }

    pub(crate) fn last(&self) -> Ref<'_, Option<S>> {
        self.0.last.borrow()
    }
}

impl<S: Clone> Cursor<S> {
    pub(crate) fn snapshot(&self) -> Option<S> {
        self.0.last.borrow().clone()
    }
}

impl<S> Clone for Cursor<S> {
    fn clone(&self) -> Self {
        Cursor(Rc::clone(&self.0))
    }
}

impl<S> Default for Cursor<S> {
    fn default() -> Self {
        Cursor(Rc::new(CursorSlot {
            recorder: Cell::new(None),
            last: RefCell::new(None),
        }))
    }
}

/// A lazy, chainable pipeline over a source of `S` currently yielding `T`.
///
/// Combinators consume the chain and hand back a re-typed chain wrapping the
/// previous iterator; nothing runs until the chain is iterated or drained by a
/// sink. Failures raised while advancing travel through the stages as `Err`
/// items and are inspected exactly once, by the outermost iterator, where an
/// installed error handler may skip them.
pub struct Chain<'a, S, T = S> {
    pub(crate) stream: Stream<'a, T>,
    pub(crate) cursor: Cursor<S>,
    pub(crate) on_error: Option<ErrorHandler<'a, S>>,
    pub(crate) probe: Option<StageCounts>,
}

impl<'a, S: 'a> Chain<'a, S, S> {
    pub fn new<I>(source: I) -> Self
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: 'a,
    {
        Self::try_new(source.into_iter().map(Ok::<S, Infallible>))
    }

    /// Builds a chain over a fallible source; its errors are upstream failures.
    pub fn try_new<I, E>(source: I) -> Self
    where
        I: IntoIterator<Item = std::result::Result<S, E>>,
        I::IntoIter: 'a,
        E: Into<BoxError>,
    {
        let cursor = Cursor::default();
        let tap = cursor.clone();
        let stream = source.into_iter().map(move |item| match item {
            Ok(value) => {
                tap.record(&value);
                Ok(value)
            }
            Err(err) => {
                tap.replace(None);
                Err(ChainError::upstream(err))
            }
        });
        Self {
            stream: Box::new(stream),
            cursor,
            on_error: None,
            probe: None,
        }
    }
}

impl<'a, S: 'a, T: 'a> Chain<'a, S, T> {
    /// Replaces the wrapped iterator with `f(current)`.
    ///
    /// This is the extension point every combinator is built on. The returned
    /// iterator is responsible for passing upstream `Err` items along; it does
    /// not need to handle them, the error handler sees them at the end.
    pub fn transform<U, F, I>(self, f: F) -> Chain<'a, S, U>
    where
        U: 'a,
        F: FnOnce(Stream<'a, T>) -> I,
        I: IntoIterator<Item = Result<U>>,
        I::IntoIter: 'a,
    {
        Chain {
            stream: Box::new(f(self.stream).into_iter()),
            cursor: self.cursor,
            on_error: self.on_error,
            probe: self.probe,
        }
    }

    /// A `transform` that shows up in the stage counters under `name`.
    pub(crate) fn stage<U, F, I>(self, name: &str, f: F) -> Chain<'a, S, U>
    where
        U: 'a,
        F: FnOnce(Stream<'a, T>) -> I,
        I: IntoIterator<Item = Result<U>>,
        I::IntoIter: 'a,
    {
        let probe = self.probe.clone();
        let chain = self.transform(f);
        match probe {
            Some(counts) => chain.transform(|stream| counts.instrument(name, stream)),
            None => chain,
        }
    }

    /// Installs the error handler, replacing any previous one.
    ///
    /// The handler gets every upstream failure together with the raw source
    /// element that was being processed (`None` if the source itself failed).
    /// Returning `Ok` skips that element and iteration carries on; returning
    /// `Err` ends iteration with [`ChainError::Handler`].
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        S: Clone,
        F: FnMut(&ChainError, Option<&S>) -> anyhow::Result<()> + 'a,
    {
        self.cursor.arm();
        self.on_error = Some(Box::new(handler));
        self
    }

    /// Counts the output of every combinator added after this call.
    pub fn with_stage_counts(mut self) -> Self {
        if self.probe.is_none() {
            self.probe = Some(StageCounts::default());
        }
        self
    }

    pub fn stage_counts(&self) -> Option<StageCounts> {
        self.probe.clone()
    }

    pub fn has_error_handler(&self) -> bool {
        self.on_error.is_some()
    }
}

impl<'a, S, T> IntoIterator for Chain<'a, S, T> {
    type Item = Result<T>;
    type IntoIter = Iter<'a, S, T>;

    fn into_iter(self) -> Iter<'a, S, T> {
        Iter {
            stream: self.stream,
            cursor: self.cursor,
            on_error: self.on_error,
            probe: self.probe,
            finished: false,
        }
    }
}

/// Pull side of a [`Chain`], applying the error policy around every advance.
pub struct Iter<'a, S, T> {
    stream: Stream<'a, T>,
    cursor: Cursor<S>,
    on_error: Option<ErrorHandler<'a, S>>,
    probe: Option<StageCounts>,
    finished: bool,
}

impl<'a, S, T> Iter<'a, S, T> {
    fn finish(&mut self) {
        self.finished = true;
        if let Some(counts) = &self.probe {
            counts.log();
        }
    }
}

impl<'a, S, T> Iterator for Iter<'a, S, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        if self.finished {
            return None;
        }
        loop {
            let err = match self.stream.next() {
                Some(Ok(value)) => return Some(Ok(value)),
                Some(Err(err)) => err,
                None => {
                    self.finish();
                    return None;
                }
            };

            if err.is_recoverable() {
                if let Some(handler) = self.on_error.as_mut() {
                    let outcome = {
                        let origin = self.cursor.last();
                        handler(&err, origin.as_ref())
                    };
                    match outcome {
                        Ok(()) => {
                            tracing::debug!(error = %err, "skipped element after handled failure");
                            continue;
                        }
                        Err(fatal) => {
                            self.finish();
                            return Some(Err(ChainError::handler(fatal)));
                        }
                    }
                }
            }

            self.finish();
            return Some(Err(err));
        }
    }
}

impl<'a, S, T> FusedIterator for Iter<'a, S, T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_yields_source_in_order() {
        let out: Vec<i32> = Chain::new(vec![1, 2, 3])
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn test_exhausted_iter_stays_exhausted() {
        let mut iter = Chain::new(vec![1]).into_iter();
        assert!(matches!(iter.next(), Some(Ok(1))));
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_cursor_only_records_when_armed() {
        let cursor: Cursor<i32> = Cursor::default();
        cursor.record(&1);
        assert_eq!(cursor.snapshot(), None);
        cursor.arm();
        cursor.record(&2);
        assert_eq!(cursor.snapshot(), Some(2));
    }

    #[test]
    fn test_source_elements_need_not_be_clone() {
        struct Handle(u8);
        let out: Vec<u8> = Chain::new(vec![Handle(1), Handle(2)])
            .map(|handle| handle.0)
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn test_source_failure_reports_no_origin() {
        let source = vec![Ok(1), Err("bad read"), Ok(3)];
        let mut seen = Vec::new();
        let out: Vec<i32> = Chain::try_new(source)
            .on_error(|err, origin| {
                seen.push((err.to_string(), origin.copied()));
                Ok(())
            })
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out, vec![1, 3]);
        assert_eq!(seen, vec![("Upstream failure: bad read".to_string(), None)]);
    }

    #[test]
    fn test_failing_handler_is_fatal() {
        let source = vec![Ok(1), Err("bad read"), Ok(3)];
        let mut iter = Chain::try_new(source)
            .on_error(|_, _| Err(anyhow::anyhow!("handler gave up")))
            .into_iter();
        assert!(matches!(iter.next(), Some(Ok(1))));
        assert!(matches!(iter.next(), Some(Err(ChainError::Handler(_)))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_on_error_replaces_previous_handler() {
        let mut first = 0;
        let mut second = 0;
        let out: Vec<i32> = Chain::try_new(vec![Err("x"), Ok(2)])
            .on_error(|_, _| {
                first += 1;
                Ok(())
            })
            .on_error(|_, _| {
                second += 1;
                Ok(())
            })
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out, vec![2]);
        assert_eq!((first, second), (0, 1));
    }
}
