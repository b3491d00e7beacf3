use crate::core::chain::{Chain, ErrorHandler, Stream};
use crate::core::stages::{tee, Expand, SharedHandler, Slice};
use crate::domain::ports::Nested;
use crate::utils::error::{BoxError, ChainError, Result};
use std::cell::RefCell;
use std::iter;
use std::ops::{Bound, RangeBounds};
use std::rc::Rc;

impl<'a, S: 'a, T: 'a> Chain<'a, S, T> {
    pub fn map<U, F>(self, mut f: F) -> Chain<'a, S, U>
    where
        U: 'a,
        F: FnMut(T) -> U + 'a,
    {
        self.stage("map", move |stream| stream.map(move |item| item.map(&mut f)))
    }

    /// Like `map`, but `f` may fail; failures are upstream errors.
    pub fn try_map<U, E, F>(self, mut f: F) -> Chain<'a, S, U>
    where
        U: 'a,
        E: Into<BoxError>,
        F: FnMut(T) -> std::result::Result<U, E> + 'a,
    {
        self.stage("try_map", move |stream| {
            stream.map(move |item| item.and_then(|value| f(value).map_err(ChainError::upstream)))
        })
    }

    /// Keeps elements for which `f` holds.
    pub fn filter<F>(self, mut f: F) -> Self
    where
        F: FnMut(&T) -> bool + 'a,
    {
        self.stage("filter", move |stream| {
            stream.filter(move |item| match item {
                Ok(value) => f(value),
                Err(_) => true,
            })
        })
    }

    pub fn try_filter<E, F>(self, mut f: F) -> Self
    where
        E: Into<BoxError>,
        F: FnMut(&T) -> std::result::Result<bool, E> + 'a,
    {
        self.stage("try_filter", move |stream| {
            stream.filter_map(move |item| match item {
                Ok(value) => match f(&value) {
                    Ok(true) => Some(Ok(value)),
                    Ok(false) => None,
                    Err(err) => Some(Err(ChainError::upstream(err))),
                },
                Err(err) => Some(Err(err)),
            })
        })
    }

    /// Drops elements for which `f` holds; the complement of `filter`.
    pub fn omit<F>(self, mut f: F) -> Self
    where
        F: FnMut(&T) -> bool + 'a,
    {
        self.stage("omit", move |stream| {
            stream.filter(move |item| match item {
                Ok(value) => !f(value),
                Err(_) => true,
            })
        })
    }

    /// Runs `f` on each element for its side effect and passes the element on.
    ///
    /// `f` may mutate the element in place.
    pub fn inspect<F>(self, mut f: F) -> Self
    where
        F: FnMut(&mut T) + 'a,
    {
        self.stage("inspect", move |stream| {
            stream.map(move |item| {
                item.map(|mut value| {
                    f(&mut value);
                    value
                })
            })
        })
    }

    pub fn try_inspect<E, F>(self, mut f: F) -> Self
    where
        E: Into<BoxError>,
        F: FnMut(&mut T) -> std::result::Result<(), E> + 'a,
    {
        self.stage("try_inspect", move |stream| {
            stream.map(move |item| {
                item.and_then(|mut value| match f(&mut value) {
                    Ok(()) => Ok(value),
                    Err(err) => Err(ChainError::upstream(err)),
                })
            })
        })
    }

    /// Replaces each element with the sequence `f` produces for it.
    pub fn mapcat<U, I, F>(self, mut f: F) -> Chain<'a, S, U>
    where
        U: 'a,
        I: IntoIterator<Item = U>,
        I::IntoIter: 'a,
        F: FnMut(T) -> I + 'a,
    {
        self.stage("mapcat", move |stream| {
            Expand::new(stream, move |value: T| -> Stream<'a, U> {
                Box::new(f(value).into_iter().map(Ok))
            })
        })
    }

    /// `mapcat` over a sequence that can fail part way through.
    ///
    /// Children already produced for an element are kept; the rest of that
    /// element's sequence is abandoned at the first failure.
    pub fn try_mapcat<U, E, I, F>(self, mut f: F) -> Chain<'a, S, U>
    where
        U: 'a,
        E: Into<BoxError>,
        I: IntoIterator<Item = std::result::Result<U, E>>,
        I::IntoIter: 'a,
        F: FnMut(T) -> I + 'a,
    {
        self.stage("try_mapcat", move |stream| {
            Expand::new(stream, move |value: T| -> Stream<'a, U> {
                Box::new(
                    f(value)
                        .into_iter()
                        .map(|child| child.map_err(ChainError::upstream)),
                )
            })
        })
    }

    pub fn slice<R: RangeBounds<usize>>(self, range: R) -> Self {
        self.slice_step(range, 1)
    }

    /// Lazily keeps every `step`-th element of `range`.
    ///
    /// # Panics
    ///
    /// Panics if `step` is zero.
    pub fn slice_step<R: RangeBounds<usize>>(self, range: R, step: usize) -> Self {
        let start = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let stop = match range.end_bound() {
            Bound::Included(&n) => Some(n.saturating_add(1)),
            Bound::Excluded(&n) => Some(n),
            Bound::Unbounded => None,
        };
        self.stage("slice", move |stream| Slice::new(stream, start, stop, step))
    }

    /// Forks the remaining elements into two independent chains.
    ///
    /// Elements one side pulls ahead of the other are buffered until the
    /// slower side reaches them. A handler installed before the fork skips a
    /// failure once, for both chains. It also stays on the first chain, along
    /// with the stage counters; the second chain starts without either.
    pub fn copy(self) -> (Self, Chain<'a, S, T>)
    where
        S: Clone,
        T: Clone,
    {
        let shared: Option<SharedHandler<'a, S>> = self.on_error.map(|handler| Rc::new(RefCell::new(handler)));
        let (first, second) = tee(self.stream, self.cursor, shared.clone());
        let (first_cursor, second_cursor) = (first.cursor(), second.cursor());
        let on_error = shared.map(|handler| -> ErrorHandler<'a, S> {
            Box::new(move |err: &ChainError, origin: Option<&S>| {
                let mut guard = handler.borrow_mut();
                let handler: &mut ErrorHandler<'a, S> = &mut guard;
                handler(err, origin)
            })
        });
        (
            Chain {
                stream: Box::new(first),
                cursor: first_cursor,
                on_error,
                probe: self.probe,
            },
            Chain {
                stream: Box::new(second),
                cursor: second_cursor,
                on_error: None,
                probe: None,
            },
        )
    }
}

impl<'a, S: 'a, T: Nested + 'a> Chain<'a, S, T> {
    /// Emits the children of every container element, in order.
    ///
    /// A leaf element fails with [`ChainError::NonIterableElement`] when
    /// `strict`, and passes through unchanged otherwise.
    pub fn flatten(self, strict: bool) -> Self {
        self.stage("flatten", move |stream| {
            Expand::new(stream, move |value: T| -> Stream<'a, T> {
                match value.into_children() {
                    Ok(children) => Box::new(children.into_iter().map(Ok)),
                    Err(leaf) if strict => Box::new(iter::once(Err(ChainError::NonIterableElement {
                        found: leaf.describe(),
                    }))),
                    Err(leaf) => Box::new(iter::once(Ok(leaf))),
                }
            })
        })
    }
}
