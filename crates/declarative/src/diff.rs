//! Structural comparison of resource snapshots
//!
//! Two snapshots are equal when every [`Compare`] implementation reports no
//! difference. Provider-assigned identifiers never take part: an expected
//! snapshot cannot know them. Sequences are compared element by element in
//! their existing order, so the same items in a different order are unequal.

use crate::types::Shared;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One differing field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    /// Dotted path to the field, e.g. `role.policies[0].document`
    pub path: String,
    /// Rendered actual value
    pub actual: String,
    /// Rendered expected value
    pub expected: String,
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: actual {} != expected {}",
            self.path, self.actual, self.expected
        )
    }
}

/// Accumulates differences found while comparing two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    entries: Vec<FieldDiff>,
    prefix: Vec<String>,
}

impl DiffReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    fn path(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.prefix.join("."), name)
        }
    }

    /// Record `name` when the two values differ
    pub fn field<T>(&mut self, name: &str, actual: &T, expected: &T)
    where
        T: PartialEq + fmt::Debug + ?Sized,
    {
        if actual != expected {
            self.entries.push(FieldDiff {
                path: self.path(name),
                actual: format!("{actual:?}"),
                expected: format!("{expected:?}"),
            });
        }
    }

    /// Compare a nested value under `name`
    pub fn nested<T: Compare + ?Sized>(&mut self, name: &str, actual: &T, expected: &T) {
        self.prefix.push(name.to_string());
        actual.compare(expected, self);
        self.prefix.pop();
    }

    /// Compare two sequences element-wise, in order
    pub fn sequence<T: Compare>(&mut self, name: &str, actual: &[T], expected: &[T]) {
        self.field(&format!("{name}.len"), &actual.len(), &expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            self.nested(&format!("{name}[{i}]"), a, e);
        }
    }

    /// Whether no difference was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of differences
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Recorded differences
    pub fn entries(&self) -> &[FieldDiff] {
        &self.entries
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Structural comparison that ignores provider-assigned fields
pub trait Compare {
    /// Record every difference between `self` (actual) and `expected`
    fn compare(&self, expected: &Self, report: &mut DiffReport);
}

/// An unset value compares like its default, so an absent child and an
/// empty one are the same thing.
impl<T: Compare + Default> Compare for Option<T> {
    fn compare(&self, expected: &Self, report: &mut DiffReport) {
        match (self, expected) {
            (Some(a), Some(e)) => a.compare(e, report),
            (Some(a), None) => a.compare(&T::default(), report),
            (None, Some(e)) => T::default().compare(e, report),
            (None, None) => {}
        }
    }
}

impl Compare for Shared {
    fn compare(&self, expected: &Self, report: &mut DiffReport) {
        report.field("name", &self.name, &expected.name);
        report.field("tags", &self.tags, &expected.tags);
    }
}

/// Compute every difference between two snapshots
pub fn diff<T: Compare + ?Sized>(actual: &T, expected: &T) -> DiffReport {
    let mut report = DiffReport::new();
    actual.compare(expected, &mut report);
    report
}

/// Whether two snapshots are structurally equal
pub fn is_equal<T: Compare + ?Sized>(actual: &T, expected: &T) -> bool {
    diff(actual, expected).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tags;

    #[derive(Debug, Clone, Default)]
    struct Item {
        shared: Shared,
        body: String,
    }

    impl Compare for Item {
        fn compare(&self, expected: &Self, report: &mut DiffReport) {
            self.shared.compare(&expected.shared, report);
            report.field("body", &self.body, &expected.body);
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Group {
        shared: Shared,
        items: Vec<Item>,
    }

    impl Compare for Group {
        fn compare(&self, expected: &Self, report: &mut DiffReport) {
            self.shared.compare(&expected.shared, report);
            report.sequence("items", &self.items, &expected.items);
        }
    }

    fn item(name: &str, body: &str) -> Item {
        Item {
            shared: Shared::new(name, Tags::new()),
            body: body.into(),
        }
    }

    #[test]
    fn test_identifier_is_ignored() {
        let actual = item("a", "x");
        let mut with_id = actual.clone();
        with_id.shared.identifier = "ID-1".into();
        assert!(is_equal(&with_id, &actual));
    }

    #[test]
    fn test_order_matters() {
        let a = Group {
            items: vec![item("p1", "d"), item("p2", "d")],
            ..Default::default()
        };
        let b = Group {
            items: vec![item("p2", "d"), item("p1", "d")],
            ..Default::default()
        };
        let report = diff(&a, &b);
        assert!(!report.is_empty());
        assert_eq!(report.entries()[0].path, "items[0].name");
    }

    #[test]
    fn test_length_difference_reported() {
        let a = Group::default();
        let b = Group {
            items: vec![item("p1", "d")],
            ..Default::default()
        };
        let report = diff(&a, &b);
        assert_eq!(report.len(), 1);
        assert_eq!(report.entries()[0].path, "items.len");
    }

    #[test]
    fn test_absent_equals_empty() {
        let none: Option<Group> = None;
        let empty = Some(Group::default());
        assert!(is_equal(&none, &empty));
        assert!(is_equal(&empty, &none));

        let filled = Some(Group {
            items: vec![item("p1", "d")],
            ..Default::default()
        });
        assert!(!is_equal(&none, &filled));
    }

    #[test]
    fn test_nested_paths() {
        let a = Group {
            items: vec![item("p1", "old")],
            ..Default::default()
        };
        let b = Group {
            items: vec![item("p1", "new")],
            ..Default::default()
        };
        let report = diff(&a, &b);
        assert_eq!(report.entries()[0].path, "items[0].body");
        assert_eq!(
            report.to_string(),
            "items[0].body: actual \"old\" != expected \"new\""
        );
    }
}
