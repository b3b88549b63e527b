use serde::{Deserialize, Serialize};

/// A package maintainer as listed in derivation metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Maintainer {
    /// GitHub handle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Maintainer {
    /// Identity used for deduplication: GitHub id first, then handle, then name.
    pub fn identity(&self) -> Option<String> {
        self.github_id
            .map(|id| format!("id:{}", id))
            .or_else(|| self.github.as_ref().map(|h| format!("gh:{}", h.to_lowercase())))
            .or_else(|| self.name.as_ref().map(|n| format!("name:{}", n)))
    }
}

/// One derivation produced by an evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
    /// Attribute path without the system suffix, e.g. `python312Packages.requests`
    pub attribute: String,
    /// Derivation name, e.g. `python3.12-requests-2.31.0`
    pub name: String,
    pub system: String,
    pub drv_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Source position relative to the repository root, e.g. `pkgs/by-name/he/hello/package.nix:47`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default)]
    pub maintainers: Vec<Maintainer>,
}

/// Package/derivation graph returned by the evaluator for one revision
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageSnapshot {
    pub derivations: Vec<Derivation>,
}

impl PackageSnapshot {
    pub fn new(mut derivations: Vec<Derivation>) -> Self {
        // Stable order so that stored snapshots and everything derived from
        // them are independent of evaluator output order.
        derivations.sort_by(|a, b| {
            (a.attribute.as_str(), a.system.as_str(), a.drv_path.as_str()).cmp(&(
                b.attribute.as_str(),
                b.system.as_str(),
                b.drv_path.as_str(),
            ))
        });
        Self { derivations }
    }

    pub fn len(&self) -> usize {
        self.derivations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.derivations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drv(attribute: &str, system: &str) -> Derivation {
        Derivation {
            attribute: attribute.to_string(),
            name: format!("{}-1.0", attribute),
            system: system.to_string(),
            drv_path: format!("/nix/store/xxx-{}-1.0.drv", attribute),
            description: None,
            position: None,
            maintainers: vec![],
        }
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let snapshot = PackageSnapshot::new(vec![
            drv("zlib", "x86_64-linux"),
            drv("hello", "x86_64-linux"),
            drv("hello", "aarch64-linux"),
        ]);
        let keys: Vec<_> = snapshot
            .derivations
            .iter()
            .map(|d| (d.attribute.as_str(), d.system.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("hello", "aarch64-linux"),
                ("hello", "x86_64-linux"),
                ("zlib", "x86_64-linux")
            ]
        );
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_maintainer_identity_prefers_github_id() {
        let m = Maintainer {
            github: Some("Alice".to_string()),
            github_id: Some(42),
            name: Some("Alice".to_string()),
        };
        assert_eq!(m.identity().as_deref(), Some("id:42"));

        let m = Maintainer {
            github: Some("Alice".to_string()),
            github_id: None,
            name: None,
        };
        assert_eq!(m.identity().as_deref(), Some("gh:alice"));

        let m = Maintainer {
            github: None,
            github_id: None,
            name: None,
        };
        assert!(m.identity().is_none());
    }
}
