use crate::tracking::domain::{AffectedProduct, VersionConstraint, VersionStatus};
use crate::tracking::policies::AffectednessPolicy;
use std::cmp::Ordering;

/// Splits a derivation name into package name and version
///
/// The package name is everything up to but not including the first dash
/// not followed by a letter; the version is everything after that dash.
/// `hello-2.12.1` -> (`hello`, `2.12.1`), `python3.12-requests-2.31.0` ->
/// (`python3.12-requests`, `2.31.0`), `fonts-noto` -> (`fonts-noto`, ``).
pub fn parse_drv_name(name: &str) -> (&str, &str) {
    let bytes = name.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'-' {
            match bytes.get(i + 1) {
                Some(next) if next.is_ascii_alphabetic() => continue,
                _ => return (&name[..i], &name[i + 1..]),
            }
        }
    }
    (name, "")
}

fn is_separator(c: char) -> bool {
    c == '.' || c == '-'
}

/// Next version component: a run of digits or a run of other
/// non-separator characters. Returns "" at the end of input.
fn next_component(s: &str) -> (&str, &str) {
    let s = s.trim_start_matches(is_separator);
    let Some(first) = s.chars().next() else {
        return ("", "");
    };
    let end = if first.is_ascii_digit() {
        s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len())
    } else {
        s.find(|c: char| c.is_ascii_digit() || is_separator(c))
            .unwrap_or(s.len())
    };
    (&s[..end], &s[end..])
}

fn is_numeric(c: &str) -> bool {
    !c.is_empty() && c.bytes().all(|b| b.is_ascii_digit())
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn component_less(c1: &str, c2: &str) -> bool {
    let n1 = is_numeric(c1);
    let n2 = is_numeric(c2);
    if n1 && n2 {
        compare_numeric(c1, c2) == Ordering::Less
    } else if c1.is_empty() && n2 {
        true
    } else if c1 == "pre" && c2 != "pre" {
        true
    } else if c2 == "pre" {
        false
    } else if n2 {
        // `2.3a` < `2.3.1`
        true
    } else if n1 {
        false
    } else {
        c1 < c2
    }
}

/// Compares two versions the way Nix `builtins.compareVersions` does
pub fn compare_versions(v1: &str, v2: &str) -> Ordering {
    let (mut p1, mut p2) = (v1, v2);
    while !p1.is_empty() || !p2.is_empty() {
        let (c1, rest1) = next_component(p1);
        let (c2, rest2) = next_component(p2);
        if component_less(c1, c2) {
            return Ordering::Less;
        }
        if component_less(c2, c1) {
            return Ordering::Greater;
        }
        p1 = rest1;
        p2 = rest2;
    }
    Ordering::Equal
}

fn is_unbounded(bound: &str) -> bool {
    matches!(bound.trim(), "" | "*" | "0" | "-" | "n/a")
}

/// Status a single constraint assigns to `version`, or `None` when the
/// constraint does not cover that version.
pub fn constraint_status(constraint: &VersionConstraint, version: &str) -> Option<VersionStatus> {
    if version.is_empty() {
        return None;
    }

    let lower = constraint.version.trim();
    let above_lower = is_unbounded(lower) || compare_versions(version, lower) != Ordering::Less;

    let covered = if let Some(upper) = constraint.less_than.as_deref() {
        above_lower && (upper.trim() == "*" || compare_versions(version, upper) == Ordering::Less)
    } else if let Some(upper) = constraint.less_than_or_equal.as_deref() {
        above_lower
            && (upper.trim() == "*" || compare_versions(version, upper) != Ordering::Greater)
    } else {
        lower == "*" || compare_versions(version, lower) == Ordering::Equal
    };

    covered.then_some(constraint.status)
}

/// Status of `version` with respect to one affected product: the combined
/// status of the covering constraints, or the product's default status.
pub fn product_status(product: &AffectedProduct, version: &str) -> VersionStatus {
    if version.is_empty() {
        return VersionStatus::Unknown;
    }
    let covering: Vec<VersionStatus> = product
        .versions
        .iter()
        .filter_map(|c| constraint_status(c, version))
        .collect();
    if covering.is_empty() {
        product.default_status
    } else {
        AffectednessPolicy::combine(covering)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(
        status: VersionStatus,
        version: &str,
        less_than: Option<&str>,
        less_than_or_equal: Option<&str>,
    ) -> VersionConstraint {
        VersionConstraint {
            status,
            version: version.to_string(),
            less_than: less_than.map(str::to_string),
            less_than_or_equal: less_than_or_equal.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_drv_name() {
        assert_eq!(parse_drv_name("hello-2.12.1"), ("hello", "2.12.1"));
        assert_eq!(
            parse_drv_name("python3.12-requests-2.31.0"),
            ("python3.12-requests", "2.31.0")
        );
        assert_eq!(parse_drv_name("fonts-noto"), ("fonts-noto", ""));
        assert_eq!(parse_drv_name("foo"), ("foo", ""));
        assert_eq!(parse_drv_name("nix-2.18.1-man"), ("nix", "2.18.1-man"));
        assert_eq!(parse_drv_name("trailing-"), ("trailing", ""));
    }

    #[test]
    fn test_compare_versions_numeric() {
        assert_eq!(compare_versions("1.0", "2.0"), Ordering::Less);
        assert_eq!(compare_versions("2.10", "2.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_versions("01", "1"), Ordering::Equal);
        assert_eq!(
            compare_versions("123456789012345678901", "99"),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_versions_nix_special_cases() {
        assert_eq!(compare_versions("2.3a", "2.3.1"), Ordering::Less);
        assert_eq!(compare_versions("2.3pre1", "2.3"), Ordering::Less);
        assert_eq!(compare_versions("2.3", "2.3pre1"), Ordering::Greater);
        assert_eq!(compare_versions("1.0-alpha", "1.0-beta"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0", "1-0-0"), Ordering::Equal);
    }

    #[test]
    fn test_constraint_less_than_range() {
        let c = constraint(VersionStatus::Affected, "0", Some("3.2"), None);
        assert_eq!(constraint_status(&c, "1.5"), Some(VersionStatus::Affected));
        assert_eq!(constraint_status(&c, "3.2"), None);
        assert_eq!(constraint_status(&c, "4.0"), None);
    }

    #[test]
    fn test_constraint_less_than_or_equal_range() {
        let c = constraint(VersionStatus::Affected, "2.0", None, Some("2.4"));
        assert_eq!(constraint_status(&c, "1.9"), None);
        assert_eq!(constraint_status(&c, "2.0"), Some(VersionStatus::Affected));
        assert_eq!(constraint_status(&c, "2.4"), Some(VersionStatus::Affected));
        assert_eq!(constraint_status(&c, "2.4.1"), None);
    }

    #[test]
    fn test_constraint_exact_and_wildcard() {
        let c = constraint(VersionStatus::Affected, "1.0", None, None);
        assert_eq!(constraint_status(&c, "1.0"), Some(VersionStatus::Affected));
        assert_eq!(constraint_status(&c, "1.1"), None);

        let c = constraint(VersionStatus::Unaffected, "*", None, None);
        assert_eq!(
            constraint_status(&c, "9.9"),
            Some(VersionStatus::Unaffected)
        );

        let c = constraint(VersionStatus::Affected, "1.2", Some("*"), None);
        assert_eq!(constraint_status(&c, "7.0"), Some(VersionStatus::Affected));
        assert_eq!(constraint_status(&c, "1.1"), None);
    }

    #[test]
    fn test_constraint_empty_version_is_not_covered() {
        let c = constraint(VersionStatus::Affected, "*", None, None);
        assert_eq!(constraint_status(&c, ""), None);
    }

    #[test]
    fn test_product_status_falls_back_to_default() {
        let product = AffectedProduct {
            vendor: None,
            product: Some("foo".to_string()),
            package_name: None,
            default_status: VersionStatus::Unaffected,
            versions: vec![constraint(VersionStatus::Affected, "0", Some("1.2"), None)],
        };
        assert_eq!(product_status(&product, "1.1"), VersionStatus::Affected);
        assert_eq!(product_status(&product, "1.3"), VersionStatus::Unaffected);
        assert_eq!(product_status(&product, ""), VersionStatus::Unknown);
    }

    #[test]
    fn test_product_status_combines_overlapping_constraints() {
        let product = AffectedProduct {
            vendor: None,
            product: None,
            package_name: Some("foo".to_string()),
            default_status: VersionStatus::Unknown,
            versions: vec![
                constraint(VersionStatus::Unaffected, "*", None, None),
                constraint(VersionStatus::Affected, "1.0", None, None),
            ],
        };
        assert_eq!(product_status(&product, "1.0"), VersionStatus::Affected);
        assert_eq!(product_status(&product, "2.0"), VersionStatus::Unaffected);
    }
}
