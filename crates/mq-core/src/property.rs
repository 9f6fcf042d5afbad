//! Property results and the checker trait.

use std::fmt;

use serde::Serialize;

use crate::counterexample::Counterexample;

/// Outcome of checking one named property.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyResult {
    /// Property name, e.g. `FifoOrder`.
    pub name: &'static str,
    /// Whether the property holds.
    pub holds: bool,
    /// Explanation when the property is violated.
    pub violation: Option<String>,
    /// Failure path, when one could be reconstructed.
    #[serde(skip)]
    pub counterexample: Option<Counterexample>,
}

impl PropertyResult {
    #[must_use]
    pub fn pass(name: &'static str) -> Self {
        Self {
            name,
            holds: true,
            violation: None,
            counterexample: None,
        }
    }

    #[must_use]
    pub fn fail(
        name: &'static str,
        violation: impl Into<String>,
        counterexample: Option<Counterexample>,
    ) -> Self {
        Self {
            name,
            holds: false,
            violation: Some(violation.into()),
            counterexample,
        }
    }
}

impl fmt::Display for PropertyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.violation {
            None => write!(f, "[PASS] {}", self.name),
            Some(v) => write!(f, "[FAIL] {}: {}", self.name, v),
        }
    }
}

/// Anything that can evaluate a set of properties.
pub trait PropertyChecker {
    fn check_all(&self) -> Vec<PropertyResult>;

    /// True when every property holds.
    fn all_hold(&self) -> bool {
        self.check_all().iter().all(|r| r.holds)
    }

    /// Only the violated properties.
    fn failures(&self) -> Vec<PropertyResult> {
        self.check_all().into_iter().filter(|r| !r.holds).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<PropertyResult>);

    impl PropertyChecker for Fixed {
        fn check_all(&self) -> Vec<PropertyResult> {
            self.0.clone()
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(PropertyResult::pass("FifoOrder").to_string(), "[PASS] FifoOrder");
        let failed = PropertyResult::fail("BoundedCapacity", "3 > 2", None);
        assert_eq!(failed.to_string(), "[FAIL] BoundedCapacity: 3 > 2");
    }

    #[test]
    fn test_failures_filters_passing() {
        let checker = Fixed(vec![
            PropertyResult::pass("A"),
            PropertyResult::fail("B", "broken", None),
        ]);
        assert!(!checker.all_hold());
        let failures = checker.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, "B");
    }

    #[test]
    fn test_serializes_without_counterexample() {
        let json = serde_json::to_string(&PropertyResult::fail("B", "x", None)).unwrap();
        assert!(json.contains("\"holds\":false"));
        assert!(!json.contains("counterexample"));
    }
}
