//! Growable owned string vector used to assemble the final argument list.
//!
//! Capacity grows only in multiples of a configured increment, rounded up to
//! satisfy the requested count, and may carry a hard ceiling. Exhaustion is
//! reported through `Result` at this boundary; terminating the process is a
//! policy decision left to the top level.

use std::collections::TryReserveError;
use std::ffi::{OsStr, OsString};

use thiserror::Error;

/// Default growth increment, in slots.
pub const DEFAULT_GROW: usize = 100;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("argument vector limit exceeded")]
    LimitExceeded,
    #[error("argument vector allocation failed: {0}")]
    Alloc(#[from] TryReserveError),
}

/// An owned, capacity-tracked array of strings.
///
/// Invariant: `len() <= capacity()` always; capacity only ever increases,
/// in multiples of the growth increment.
#[derive(Debug)]
pub struct ArgVec {
    items: Vec<OsString>,
    capacity: usize,
    grow: usize,
    limit: Option<usize>,
}

impl Default for ArgVec {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgVec {
    pub fn new() -> Self {
        Self::with_grow(DEFAULT_GROW)
    }

    pub fn with_grow(grow: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity: 0,
            grow,
            limit: None,
        }
    }

    /// Cap the total capacity. Growth that would reach the limit fails.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&OsStr> {
        self.items.get(index).map(OsString::as_os_str)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OsString> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[OsString] {
        &self.items
    }

    /// Ensure room for `n` more items, growing capacity by the smallest
    /// multiple of the increment that satisfies the request.
    ///
    /// On failure the vector is left unchanged.
    pub fn reserve(&mut self, n: usize) -> Result<(), VectorError> {
        if self.items.len() + n <= self.capacity {
            return Ok(());
        }
        let grow = self.grow.max(1);
        let short = self.items.len() + n - self.capacity;
        let step = short.div_ceil(grow) * grow;
        let new_capacity = self.capacity + step;
        if let Some(limit) = self.limit {
            if new_capacity >= limit {
                return Err(VectorError::LimitExceeded);
            }
        }
        self.items.try_reserve_exact(new_capacity - self.items.len())?;
        self.capacity = new_capacity;
        Ok(())
    }

    /// Append one owned string. The caller must have reserved space.
    pub fn push(&mut self, item: OsString) {
        debug_assert!(
            self.items.len() < self.capacity,
            "push without a prior reserve"
        );
        self.items.push(item);
    }

    /// Release the owned strings. Idempotent.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn into_vec(self) -> Vec<OsString> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(s: &str) -> OsString {
        OsString::from(s)
    }

    #[test]
    fn appends_preserve_count_and_order() {
        let mut av = ArgVec::with_grow(4);
        for i in 0..10 {
            av.reserve(1).unwrap();
            av.push(os(&format!("arg{i}")));
        }
        assert_eq!(av.len(), 10);
        assert!(av.capacity() >= 10);
        for i in 0..10 {
            assert_eq!(av.get(i), Some(OsStr::new(&format!("arg{i}") as &str)));
        }
    }

    #[test]
    fn capacity_grows_in_increment_multiples() {
        let mut av = ArgVec::with_grow(8);
        av.reserve(1).unwrap();
        assert_eq!(av.capacity(), 8);
        av.reserve(9).unwrap();
        assert_eq!(av.capacity(), 16);
        // A large request is rounded up to a multiple of the increment.
        av.reserve(21).unwrap();
        assert_eq!(av.capacity(), 24);
    }

    #[test]
    fn reserve_within_capacity_is_a_noop() {
        let mut av = ArgVec::with_grow(10);
        av.reserve(3).unwrap();
        let cap = av.capacity();
        av.reserve(3).unwrap();
        assert_eq!(av.capacity(), cap);
    }

    #[test]
    fn limit_is_enforced_and_vector_unchanged() {
        let mut av = ArgVec::with_grow(10).with_limit(20);
        av.reserve(5).unwrap();
        av.push(os("x"));
        assert!(matches!(av.reserve(15), Err(VectorError::LimitExceeded)));
        assert_eq!(av.len(), 1);
        assert_eq!(av.capacity(), 10);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut av = ArgVec::new();
        av.reserve(2).unwrap();
        av.push(os("a"));
        av.push(os("b"));
        av.clear();
        assert!(av.is_empty());
        av.clear();
        assert!(av.is_empty());
    }

    #[test]
    fn zero_grow_still_makes_progress() {
        let mut av = ArgVec::with_grow(0);
        av.reserve(3).unwrap();
        assert!(av.capacity() >= 3);
    }
}
