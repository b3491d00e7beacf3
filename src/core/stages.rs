//! Stateful stage iterators behind the combinators that cannot be expressed
//! with plain `Iterator` adapters.

use crate::core::chain::{Cursor, ErrorHandler, Stream};
use crate::utils::error::{ChainError, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// One-to-many expansion: drains each parent's children before pulling the next parent.
///
/// A failing child abandons the rest of its parent's expansion.
pub(crate) struct Expand<'a, T, U, F> {
    upstream: Stream<'a, T>,
    expand: F,
    current: Option<Stream<'a, U>>,
}

impl<'a, T, U, F> Expand<'a, T, U, F>
where
    F: FnMut(T) -> Stream<'a, U>,
{
    pub(crate) fn new(upstream: Stream<'a, T>, expand: F) -> Self {
        Self {
            upstream,
            expand,
            current: None,
        }
    }
}

impl<'a, T, U, F> Iterator for Expand<'a, T, U, F>
where
    F: FnMut(T) -> Stream<'a, U>,
{
    type Item = Result<U>;

    fn next(&mut self) -> Option<Result<U>> {
        loop {
            if let Some(children) = self.current.as_mut() {
                match children.next() {
                    Some(Ok(child)) => return Some(Ok(child)),
                    Some(Err(err)) => {
                        self.current = None;
                        return Some(Err(err));
                    }
                    None => self.current = None,
                }
            }
            match self.upstream.next()? {
                Ok(parent) => self.current = Some((self.expand)(parent)),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Lazy `start..stop` slicing with a step.
///
/// Failed items pass through without taking a position.
pub(crate) struct Slice<'a, T> {
    upstream: Stream<'a, T>,
    position: usize,
    wanted: usize,
    stop: Option<usize>,
    step: usize,
}

impl<'a, T> Slice<'a, T> {
    pub(crate) fn new(upstream: Stream<'a, T>, start: usize, stop: Option<usize>, step: usize) -> Self {
        assert!(step > 0, "slice step must be positive");
        Self {
            upstream,
            position: 0,
            wanted: start,
            stop,
            step,
        }
    }
}

impl<'a, T> Iterator for Slice<'a, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        loop {
            if matches!(self.stop, Some(stop) if self.wanted >= stop) {
                return None;
            }
            match self.upstream.next()? {
                Err(err) => return Some(Err(err)),
                Ok(value) => {
                    let index = self.position;
                    self.position += 1;
                    if index == self.wanted {
                        self.wanted = self.wanted.saturating_add(self.step);
                        return Some(Ok(value));
                    }
                }
            }
        }
    }
}

/// An error handler shared between a fork and the chain it was installed on.
pub(crate) type SharedHandler<'a, S> = Rc<RefCell<ErrorHandler<'a, S>>>;

struct TeeState<'a, S, T> {
    upstream: Stream<'a, T>,
    origin: Cursor<S>,
    on_error: Option<SharedHandler<'a, S>>,
    buffers: [VecDeque<(Option<S>, Result<T>)>; 2],
    alive: [bool; 2],
}

impl<'a, S: Clone, T> TeeState<'a, S, T> {
    /// Next upstream item with the handler installed before the fork already
    /// applied, so both sides see the same filtered stream.
    fn pull(&mut self) -> Option<(Option<S>, Result<T>)> {
        loop {
            let item = self.upstream.next()?;
            let origin = self.origin.snapshot();
            let err = match item {
                Err(err) if err.is_recoverable() => err,
                item => return Some((origin, item)),
            };
            let Some(handler) = self.on_error.as_ref() else {
                return Some((origin, Err(err)));
            };
            let outcome = {
                let mut guard = handler.borrow_mut();
                let handler: &mut ErrorHandler<'a, S> = &mut guard;
                handler(&err, origin.as_ref())
            };
            match outcome {
                Ok(()) => tracing::debug!(error = %err, "skipped element before fork"),
                Err(fatal) => return Some((origin, Err(ChainError::handler(fatal)))),
            }
        }
    }
}

/// One side of a forked stream.
///
/// Whatever one side pulls ahead of the other is queued for it together with
/// the source element it came from.
pub(crate) struct TeeBranch<'a, S, T> {
    state: Rc<RefCell<TeeState<'a, S, T>>>,
    side: usize,
    cursor: Cursor<S>,
}

pub(crate) fn tee<'a, S: Clone, T>(
    upstream: Stream<'a, T>,
    origin: Cursor<S>,
    on_error: Option<SharedHandler<'a, S>>,
) -> (TeeBranch<'a, S, T>, TeeBranch<'a, S, T>) {
    origin.arm();
    let state = Rc::new(RefCell::new(TeeState {
        upstream,
        origin,
        on_error,
        buffers: [VecDeque::new(), VecDeque::new()],
        alive: [true, true],
    }));
    let branch = |side| TeeBranch {
        state: Rc::clone(&state),
        side,
        cursor: Cursor::default(),
    };
    (branch(0), branch(1))
}

impl<'a, S, T> TeeBranch<'a, S, T> {
    pub(crate) fn cursor(&self) -> Cursor<S> {
        self.cursor.clone()
    }
}

impl<'a, S: Clone, T: Clone> Iterator for TeeBranch<'a, S, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        let mut state = self.state.borrow_mut();
        if let Some((origin, item)) = state.buffers[self.side].pop_front() {
            self.cursor.replace(origin);
            return Some(item);
        }

        let (origin, item) = state.pull()?;
        let other = 1 - self.side;
        if state.alive[other] {
            state.buffers[other].push_back((origin.clone(), item.clone()));
        }
        self.cursor.replace(origin);
        Some(item)
    }
}

impl<'a, S, T> Drop for TeeBranch<'a, S, T> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.alive[self.side] = false;
            state.buffers[self.side].clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(values: Vec<i32>) -> Stream<'static, i32> {
        Box::new(values.into_iter().map(Ok))
    }

    #[test]
    fn test_slice_with_step() {
        let out: Vec<i32> = Slice::new(stream((0..10).collect()), 2, Some(8), 3)
            .map(|item| item.unwrap())
            .collect();
        assert_eq!(out, vec![2, 5]);
    }

    #[test]
    fn test_slice_stops_pulling_at_stop() {
        let mut pulled = 0;
        let source = (0..100).inspect(|_| pulled += 1).map(Ok);
        let out: Vec<i32> = Slice::new(Box::new(source), 0, Some(3), 1)
            .map(|item| item.unwrap())
            .collect();
        assert_eq!(out, vec![0, 1, 2]);
        assert_eq!(pulled, 3);
    }

    #[test]
    fn test_tee_buffers_for_slower_side() {
        let (mut fast, mut slow) = tee(stream(vec![1, 2, 3]), Cursor::<i32>::default(), None);
        let ahead: Vec<i32> = fast.by_ref().map(|item| item.unwrap()).collect();
        assert_eq!(ahead, vec![1, 2, 3]);
        assert!(matches!(slow.next(), Some(Ok(1))));
        assert!(matches!(slow.next(), Some(Ok(2))));
        assert!(matches!(slow.next(), Some(Ok(3))));
        assert!(slow.next().is_none());
    }

    #[test]
    fn test_tee_stops_buffering_for_dropped_side() {
        let (mut left, right) = tee(stream(vec![1, 2]), Cursor::<i32>::default(), None);
        drop(right);
        assert_eq!(left.by_ref().count(), 2);
        assert!(left.state.borrow().buffers[1].is_empty());
    }

    #[test]
    fn test_tee_skips_handled_failures_once() {
        let calls = Rc::new(RefCell::new(0));
        let tally = Rc::clone(&calls);
        let handler: ErrorHandler<'static, i32> = Box::new(move |_, _| {
            *tally.borrow_mut() += 1;
            Ok(())
        });
        let upstream: Stream<'static, i32> = Box::new(vec![Ok(1), Err(ChainError::upstream("bad")), Ok(3)].into_iter());
        let (left, right) = tee(upstream, Cursor::default(), Some(Rc::new(RefCell::new(handler))));
        let left: Vec<i32> = left.map(|item| item.unwrap()).collect();
        let right: Vec<i32> = right.map(|item| item.unwrap()).collect();
        assert_eq!((left, right), (vec![1, 3], vec![1, 3]));
        assert_eq!(*calls.borrow(), 1);
    }
}
