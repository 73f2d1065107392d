//! Content-stable values for dependency tracking.
//!
//! Callers often rebuild option structs on every update. [`StableValue`]
//! hands back the previously seen `Arc` whenever the new value has the same
//! content, and only bumps its revision when the content really changed.

use std::sync::Arc;

/// Memoizes one value across updates by content.
#[derive(Debug)]
pub struct StableValue<T> {
    current: Option<Arc<T>>,
    revision: u64,
}

impl<T> Default for StableValue<T> {
    fn default() -> Self {
        Self {
            current: None,
            revision: 0,
        }
    }
}

impl<T: PartialEq> StableValue<T> {
    /// Create an empty cache; the first stabilized value becomes revision 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `value` against the cached one and keep whichever is stable.
    ///
    /// Pointer equality is checked first, then `PartialEq`.
    ///
    /// # Returns
    /// The stable reference and its revision. The revision changes if and
    /// only if the content changed.
    pub fn stabilize(&mut self, value: Arc<T>) -> (Arc<T>, u64) {
        match self.current.as_ref() {
            Some(current) if Arc::ptr_eq(current, &value) || **current == *value => {
                (current.clone(), self.revision)
            }
            Some(_) => {
                self.revision = self.revision.wrapping_add(1);
                self.current = Some(value.clone());
                (value, self.revision)
            }
            None => {
                self.current = Some(value.clone());
                (value, self.revision)
            }
        }
    }

    /// Convenience wrapper for owned values.
    pub fn stabilize_owned(&mut self, value: T) -> (Arc<T>, u64) {
        self.stabilize(Arc::new(value))
    }

    /// Revision of the cached value; 0 before and after the first value.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Cached value, or `None` before anything was stabilized.
    pub fn current(&self) -> Option<&Arc<T>> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::StableValue;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    struct Opts {
        delay: Option<u64>,
        aliases: BTreeMap<String, String>,
    }

    fn opts(delay: Option<u64>) -> Opts {
        let mut aliases = BTreeMap::new();
        aliases.insert("mylang".to_string(), "rust".to_string());
        Opts { delay, aliases }
    }

    #[test]
    fn structurally_equal_values_keep_first_reference_and_revision() {
        let mut cache = StableValue::new();
        let first = Arc::new(opts(Some(100)));
        let (stable_a, rev_a) = cache.stabilize(first.clone());
        let (stable_b, rev_b) = cache.stabilize(Arc::new(opts(Some(100))));

        assert_eq!(rev_a, rev_b);
        assert!(Arc::ptr_eq(&stable_a, &first));
        assert!(Arc::ptr_eq(&stable_b, &first));
    }

    #[test]
    fn content_change_bumps_revision_once() {
        let mut cache = StableValue::new();
        let (_, rev0) = cache.stabilize_owned(opts(None));
        let (_, rev1) = cache.stabilize_owned(opts(Some(50)));
        let (_, rev1_again) = cache.stabilize_owned(opts(Some(50)));

        assert_eq!(rev0, 0);
        assert_eq!(rev1, 1);
        assert_eq!(rev1_again, 1);
    }

    #[test]
    fn primitives_compare_by_value() {
        let mut cache = StableValue::new();
        assert_eq!(cache.stabilize_owned("rust".to_string()).1, 0);
        assert_eq!(cache.stabilize_owned("rust".to_string()).1, 0);
        assert_eq!(cache.stabilize_owned("go".to_string()).1, 1);
        assert_eq!(cache.current().map(|v| v.as_str()), Some("go"));
    }
}
