use crate::tracking::domain::VersionStatus;

/// AffectednessPolicy combines the statuses that individual version
/// constraints of a CVE assign to one concrete package version
///
/// When in doubt the policy leans towards reporting a package:
/// 1. Any `affected` makes the result `affected`
/// 2. Otherwise any `unknown` makes the result `unknown`
/// 3. Only when every constraint says `unaffected` is the result `unaffected`
///
/// No constraints at all means nothing is known: `unknown`.
pub struct AffectednessPolicy;

impl AffectednessPolicy {
    pub fn combine<I>(statuses: I) -> VersionStatus
    where
        I: IntoIterator<Item = VersionStatus>,
    {
        let mut result: Option<VersionStatus> = None;
        for status in statuses {
            result = Some(match (result, status) {
                (None, s) => s,
                (Some(VersionStatus::Affected), _) | (_, VersionStatus::Affected) => {
                    VersionStatus::Affected
                }
                (Some(VersionStatus::Unknown), _) | (_, VersionStatus::Unknown) => {
                    VersionStatus::Unknown
                }
                (Some(VersionStatus::Unaffected), VersionStatus::Unaffected) => {
                    VersionStatus::Unaffected
                }
            });
        }
        result.unwrap_or(VersionStatus::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VersionStatus::{Affected, Unaffected, Unknown};

    #[test]
    fn test_empty_is_unknown() {
        assert_eq!(AffectednessPolicy::combine(Vec::new()), Unknown);
    }

    #[test]
    fn test_affected_dominates() {
        assert_eq!(AffectednessPolicy::combine([Unknown, Affected]), Affected);
        assert_eq!(AffectednessPolicy::combine([Affected, Unaffected]), Affected);
        assert_eq!(
            AffectednessPolicy::combine([Unaffected, Unknown, Affected]),
            Affected
        );
    }

    #[test]
    fn test_unknown_dominates_unaffected() {
        assert_eq!(AffectednessPolicy::combine([Unaffected, Unknown]), Unknown);
        assert_eq!(AffectednessPolicy::combine([Unknown, Unaffected]), Unknown);
    }

    #[test]
    fn test_all_unaffected() {
        assert_eq!(
            AffectednessPolicy::combine([Unaffected, Unaffected]),
            Unaffected
        );
    }

    #[test]
    fn test_order_independent() {
        let a = AffectednessPolicy::combine([Unaffected, Unknown, Unaffected]);
        let b = AffectednessPolicy::combine([Unknown, Unaffected, Unaffected]);
        assert_eq!(a, b);
    }
}
