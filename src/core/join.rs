//! Two-source key join.
//!
//! Both sides are pulled alternately. A record whose key is already waiting on
//! the opposite side completes a match and is emitted merged; anything else
//! waits in its own side's pending buffer. Keys are assumed unique per side.

use crate::core::chain::{Chain, Stream};
use crate::domain::ports::Keyed;
use crate::utils::error::{ChainError, Result};
use std::collections::HashMap;
use std::fmt::Display;

const LEFT: usize = 0;

pub(crate) struct Join<'a, T> {
    key: String,
    sides: [Option<Stream<'a, T>>; 2],
    pending: [HashMap<String, T>; 2],
    turn: usize,
}

impl<'a, T> Join<'a, T>
where
    T: Keyed,
    T::Value: Display,
{
    pub(crate) fn new(key: String, left: Stream<'a, T>, right: Stream<'a, T>) -> Self {
        Self {
            key,
            sides: [Some(left), Some(right)],
            pending: [HashMap::new(), HashMap::new()],
            turn: LEFT,
        }
    }

    /// Matches `record` against the opposite side or parks it.
    fn admit(&mut self, side: usize, record: T) -> Result<Option<T>> {
        let token = record
            .get_key(&self.key)
            .map(|value| value.to_string())
            .ok_or_else(|| ChainError::missing_key(&self.key))?;

        let other = 1 - side;
        match self.pending[other].remove(&token) {
            Some(mate) => {
                // The left record is the base; right-hand fields win on collision.
                let (mut merged, overlay) = if side == LEFT { (record, mate) } else { (mate, record) };
                merged.merge(overlay);
                Ok(Some(merged))
            }
            None if self.sides[other].is_none() => {
                tracing::trace!(key = %token, "dropping record, opposite side is exhausted");
                Ok(None)
            }
            None => {
                tracing::trace!(key = %token, side, "buffering unmatched record");
                self.pending[side].insert(token, record);
                Ok(None)
            }
        }
    }

    /// Once a side is exhausted, nothing parked on the other side can match.
    fn exhaust(&mut self, side: usize) {
        self.sides[side] = None;
        let other = 1 - side;
        let orphans = self.pending[other].len();
        if orphans > 0 {
            tracing::warn!(orphans, "discarding records that can no longer be matched");
            self.pending[other].clear();
        }
    }
}

impl<'a, T> Iterator for Join<'a, T>
where
    T: Keyed,
    T::Value: Display,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        loop {
            if self.sides.iter().all(Option::is_none) {
                return None;
            }
            let side = self.turn;
            self.turn = 1 - side;

            let Some(stream) = self.sides[side].as_mut() else {
                continue;
            };
            match stream.next() {
                None => self.exhaust(side),
                Some(Err(err)) => return Some(Err(err)),
                Some(Ok(record)) => match self.admit(side, record) {
                    Ok(Some(merged)) => return Some(Ok(merged)),
                    Ok(None) => {}
                    Err(err) => return Some(Err(err)),
                },
            }
        }
    }
}

impl<'a, S: 'a, T> Chain<'a, S, T>
where
    T: Keyed + 'a,
    T::Value: Display,
{
    /// Joins this chain with `other` on `key`, emitting merged records as
    /// matches complete.
    ///
    /// The merged record starts from this chain's record and takes every field
    /// of `other`'s record on top. Records that never find a mate are dropped.
    /// Memory grows with the number of records still waiting for a mate, which
    /// for disjoint inputs is everything either side has produced.
    pub fn join_on_key<K, I>(self, key: K, other: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = T>,
        I::IntoIter: 'a,
    {
        self.join_stream(key.into(), Box::new(other.into_iter().map(Ok)))
    }

    /// [`Chain::join_on_key`] against another chain.
    ///
    /// If `other` has an error handler it applies it first and whatever it
    /// lets through reaches this chain's handler. Without one, its failures
    /// pass straight to this chain's handler, reported against this chain's
    /// last source element.
    pub fn join_chain_on_key<K, S2>(self, key: K, other: Chain<'a, S2, T>) -> Self
    where
        K: Into<String>,
        S2: 'a,
    {
        let other: Stream<'a, T> = if other.has_error_handler() {
            Box::new(other.into_iter())
        } else {
            other.stream
        };
        self.join_stream(key.into(), other)
    }

    fn join_stream(self, key: String, other: Stream<'a, T>) -> Self {
        self.stage("join_on_key", move |stream| Join::new(key, stream, other))
    }
}
