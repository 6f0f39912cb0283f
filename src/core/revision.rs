//! Structural revision tracking.
//!
//! Every structural change to a machine (adding states, ports or actions,
//! editing a guard, relinking a transition) bumps the machine's
//! [`Revision`]. Derived data is stored in a [`Cached`] cell stamped with
//! the revision it was computed at and recomputed lazily on mismatch.

use serde::{Deserialize, Serialize};

/// Monotonic counter of structural changes, owned by the model graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Revision(u64);

impl Revision {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// Advance the counter, returning the new revision.
    pub fn bump(&mut self) -> Revision {
        self.0 += 1;
        *self
    }
}

/// A lazily computed value tagged with the revision it is valid for.
///
/// # Example
///
/// ```rust
/// use fsm_kernel::core::{Cached, Revision};
///
/// let mut revision = Revision::new();
/// let mut cell: Cached<usize> = Cached::new();
/// let mut computed = 0;
///
/// for _ in 0..3 {
///     cell.get_or_update(revision, || { computed += 1; 42 });
/// }
/// assert_eq!(computed, 1);
///
/// revision.bump();
/// cell.get_or_update(revision, || { computed += 1; 42 });
/// assert_eq!(computed, 2);
/// ```
#[derive(Clone, Debug)]
pub struct Cached<T> {
    entry: Option<(Revision, T)>,
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Cached<T> {
    pub fn new() -> Self {
        Self { entry: None }
    }

    /// Whether a value computed at `revision` is present.
    pub fn is_current(&self, revision: Revision) -> bool {
        matches!(&self.entry, Some((stamp, _)) if *stamp == revision)
    }

    /// The cached value if it is still valid at `revision`.
    pub fn get(&self, revision: Revision) -> Option<&T> {
        match &self.entry {
            Some((stamp, value)) if *stamp == revision => Some(value),
            _ => None,
        }
    }

    pub fn get_or_update(&mut self, revision: Revision, compute: impl FnOnce() -> T) -> &T {
        if !self.is_current(revision) {
            self.entry = Some((revision, compute()));
        }
        match &self.entry {
            Some((_, value)) => value,
            None => unreachable!("entry populated above"),
        }
    }

    /// Like [`get_or_update`](Self::get_or_update) for fallible computations.
    /// A failed computation leaves the cell empty.
    pub fn get_or_try_update<E>(
        &mut self,
        revision: Revision,
        compute: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, E> {
        if !self.is_current(revision) {
            self.entry = None;
            self.entry = Some((revision, compute()?));
        }
        match &self.entry {
            Some((_, value)) => Ok(value),
            None => unreachable!("entry populated above"),
        }
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_is_monotonic() {
        let mut revision = Revision::new();
        let first = revision.bump();
        let second = revision.bump();
        assert!(second > first);
        assert_eq!(second.value(), 2);
    }

    #[test]
    fn cached_value_is_reused_until_revision_changes() {
        let mut revision = Revision::new();
        let mut cell = Cached::new();
        assert_eq!(*cell.get_or_update(revision, || 1), 1);
        assert_eq!(*cell.get_or_update(revision, || 2), 1);

        revision.bump();
        assert!(cell.get(revision).is_none());
        assert_eq!(*cell.get_or_update(revision, || 3), 3);
    }

    #[test]
    fn failed_computation_leaves_cell_empty() {
        let revision = Revision::new();
        let mut cell: Cached<u8> = Cached::new();
        let result: Result<&u8, &str> = cell.get_or_try_update(revision, || Err("boom"));
        assert!(result.is_err());
        assert!(!cell.is_current(revision));
    }

    #[test]
    fn invalidate_forces_recompute() {
        let revision = Revision::new();
        let mut cell = Cached::new();
        cell.get_or_update(revision, || "old");
        cell.invalidate();
        assert_eq!(*cell.get_or_update(revision, || "new"), "new");
    }
}
