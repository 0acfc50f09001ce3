use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Source of monotonically increasing request versions.
#[derive(Debug, Default)]
pub struct QueryVersions {
    latest: AtomicU64,
}

impl QueryVersions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a new request. The first version is 1.
    pub fn next(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Version of the most recent request, 0 before any.
    #[must_use]
    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_current(&self, version: u64) -> bool {
        self.latest() == version
    }
}

/// A value that only accepts results from the most recently requested version.
#[derive(Debug, Default)]
pub struct VersionedState<T> {
    versions: QueryVersions,
    applied: Mutex<Option<(u64, T)>>,
}

impl<T> VersionedState<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            versions: QueryVersions::new(),
            applied: Mutex::new(None),
        }
    }

    /// Register a new request and return its version.
    pub fn begin(&self) -> u64 {
        self.versions.next()
    }

    #[must_use]
    pub const fn versions(&self) -> &QueryVersions {
        &self.versions
    }

    /// Store `value` if `version` is still the latest request. Stale results are dropped.
    pub fn apply(&self, version: u64, value: T) -> bool {
        let mut applied = self.applied.lock().expect("lock poisoned");

        // checked under the lock so a concurrent newer apply cannot be overwritten
        if !self.versions.is_current(version) {
            return false;
        }

        *applied = Some((version, value));
        true
    }

    /// Version of the value currently held, if any.
    #[must_use]
    pub fn applied_version(&self) -> Option<u64> {
        self.applied.lock().expect("lock poisoned").as_ref().map(|(v, _)| *v)
    }

    /// Run `f` over the current value.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let applied = self.applied.lock().expect("lock poisoned");
        f(applied.as_ref().map(|(_, value)| value))
    }
}

impl<T: Clone> VersionedState<T> {
    #[must_use]
    pub fn current(&self) -> Option<T> {
        self.with(|value| value.cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_increase() {
        let versions = QueryVersions::new();
        assert_eq!(versions.latest(), 0);
        assert_eq!(versions.next(), 1);
        assert_eq!(versions.next(), 2);
        assert!(versions.is_current(2));
        assert!(!versions.is_current(1));
    }

    #[test]
    fn test_late_stale_result_is_discarded() {
        let state = VersionedState::new();
        let broad = state.begin();
        let narrow = state.begin();

        assert!(state.apply(narrow, "narrow"));
        assert!(!state.apply(broad, "broad"));

        assert_eq!(state.current(), Some("narrow"));
        assert_eq!(state.applied_version(), Some(narrow));
    }

    #[test]
    fn test_early_stale_result_is_discarded() {
        let state = VersionedState::new();
        let first = state.begin();
        let second = state.begin();

        assert!(!state.apply(first, 1));
        assert_eq!(state.current(), None);
        assert!(state.apply(second, 2));
        assert_eq!(state.current(), Some(2));
    }
}
