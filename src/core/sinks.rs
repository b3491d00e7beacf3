//! Terminal operations. Each one drives the chain to exhaustion (or to the
//! first failure the error handler does not absorb) and consumes it.

use crate::core::chain::Chain;
use crate::utils::error::{BoxError, ChainError, Result};

impl<'a, S: 'a, T: 'a> Chain<'a, S, T> {
    /// Folds the elements pairwise, seeding with the first one.
    ///
    /// An empty chain fails with [`ChainError::EmptySequence`].
    pub fn reduce<F>(self, mut f: F) -> Result<T>
    where
        F: FnMut(T, T) -> T,
    {
        let mut iter = self.into_iter();
        let first = match iter.next() {
            Some(item) => item?,
            None => return Err(ChainError::EmptySequence),
        };
        iter.try_fold(first, |acc, item| Ok(f(acc, item?)))
    }

    /// Folds the elements into `first`; an empty chain yields `first` unchanged.
    pub fn fold<A, F>(self, first: A, mut f: F) -> Result<A>
    where
        F: FnMut(A, T) -> A,
    {
        self.into_iter().try_fold(first, |acc, item| Ok(f(acc, item?)))
    }

    pub fn for_each<F>(self, mut f: F) -> Result<()>
    where
        F: FnMut(T),
    {
        for item in self {
            f(item?);
        }
        Ok(())
    }

    /// Like [`Chain::for_each`], but `f` may fail. Its failures go through the
    /// error handler like any other upstream failure.
    pub fn try_for_each<E, F>(self, mut f: F) -> Result<()>
    where
        E: Into<BoxError>,
        F: FnMut(T) -> std::result::Result<(), E> + 'a,
    {
        self.try_map(move |value| f(value)).sink()
    }

    /// Number of elements that made it through.
    pub fn count(self) -> Result<usize> {
        let mut count = 0;
        for item in self {
            item?;
            count += 1;
        }
        tracing::debug!(count, "chain drained");
        Ok(count)
    }

    /// Runs the chain for its side effects, discarding the output.
    pub fn sink(self) -> Result<()> {
        for item in self {
            item?;
        }
        Ok(())
    }

    pub fn to_vec(self) -> Result<Vec<T>> {
        self.into_iter().collect()
    }
}
