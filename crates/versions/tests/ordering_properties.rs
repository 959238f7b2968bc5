//! Property-based tests for version ordering and range evaluation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use monodep_versions::{SemanticVersion, VersionRange};
use proptest::prelude::*;
use std::cmp::Ordering;

fn identifier_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "(0|[1-9][0-9]{0,3})".prop_map(String::from),
        "[a-z][a-z0-9-]{0,5}".prop_map(String::from),
    ]
}

fn version_strategy() -> impl Strategy<Value = String> {
    (
        0u64..20,
        0u64..20,
        0u64..20,
        proptest::option::of(proptest::collection::vec(identifier_strategy(), 1..4)),
    )
        .prop_map(|(major, minor, patch, pre)| match pre {
            Some(ids) => format!("{major}.{minor}.{patch}-{}", ids.join(".")),
            None => format!("{major}.{minor}.{patch}"),
        })
}

proptest! {
    #[test]
    fn compare_is_reflexive(raw in version_strategy()) {
        let a = SemanticVersion::parse(&raw).unwrap();
        let b = SemanticVersion::parse(&raw).unwrap();
        prop_assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn compare_is_antisymmetric(a in version_strategy(), b in version_strategy()) {
        let a = SemanticVersion::parse(&a).unwrap();
        let b = SemanticVersion::parse(&b).unwrap();
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
    }

    #[test]
    fn compare_is_transitive(
        a in version_strategy(),
        b in version_strategy(),
        c in version_strategy(),
    ) {
        let mut sorted = [
            SemanticVersion::parse(&a).unwrap(),
            SemanticVersion::parse(&b).unwrap(),
            SemanticVersion::parse(&c).unwrap(),
        ];
        sorted.sort();
        if sorted[0] < sorted[1] && sorted[1] < sorted[2] {
            prop_assert!(sorted[0] < sorted[2]);
        }
    }

    #[test]
    fn ordering_agrees_with_semver_crate(a in version_strategy(), b in version_strategy()) {
        let ours = SemanticVersion::parse(&a).unwrap().cmp(&SemanticVersion::parse(&b).unwrap());
        let theirs = semver::Version::parse(&a).unwrap().cmp(&semver::Version::parse(&b).unwrap());
        prop_assert_eq!(ours, theirs);
    }

    #[test]
    fn range_version_satisfies_its_inclusive_operators(raw in version_strategy()) {
        let version = SemanticVersion::parse(&raw).unwrap();
        for op in ["^", "~", ">=", "<=", "="] {
            let range = VersionRange::parse(&format!("{op}{raw}")).unwrap();
            prop_assert!(range.satisfies(&version), "{}{} should accept {}", op, raw, raw);
        }
        for op in [">", "<"] {
            let range = VersionRange::parse(&format!("{op}{raw}")).unwrap();
            prop_assert!(!range.satisfies(&version));
        }
    }

    #[test]
    fn tilde_is_never_wider_than_caret_for_stable_majors(
        base in version_strategy(),
        candidate in version_strategy(),
    ) {
        let base_version = SemanticVersion::parse(&base).unwrap();
        prop_assume!(base_version.major > 0);
        let tilde = VersionRange::parse(&format!("~{base}")).unwrap();
        let caret = VersionRange::parse(&format!("^{base}")).unwrap();
        let candidate = SemanticVersion::parse(&candidate).unwrap();
        if tilde.satisfies(&candidate) {
            prop_assert!(caret.satisfies(&candidate));
        }
    }
}
