use super::version_matching::{parse_drv_name, product_status};
use crate::tracking::domain::{
    AffectedProduct, ChannelSnapshot, CveRecord, Derivation, Maintainer, MatchBasis, Suggestion,
    SuggestionPayload, VersionStatus,
};
use crate::tracking::policies::AffectednessPolicy;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Default cap on the number of packages a single CVE may match in one channel
pub const DEFAULT_MAX_MATCHES: usize = 1000;

/// Lookup of derivations by lowercased package name and attribute leaf
struct PackageIndex<'a> {
    by_name: HashMap<String, Vec<&'a Derivation>>,
}

impl<'a> PackageIndex<'a> {
    fn build(channel: &'a ChannelSnapshot) -> Self {
        let mut by_name: HashMap<String, Vec<&'a Derivation>> = HashMap::new();
        for drv in &channel.snapshot.derivations {
            let pname = parse_drv_name(&drv.name).0.to_lowercase();
            let leaf = drv
                .attribute
                .rsplit('.')
                .next()
                .unwrap_or(&drv.attribute)
                .to_lowercase();
            if leaf != pname {
                by_name.entry(leaf).or_default().push(drv);
            }
            by_name.entry(pname).or_default().push(drv);
        }
        Self { by_name }
    }

    fn lookup(&self, name: &str) -> &[&'a Derivation] {
        self.by_name
            .get(&name.trim().to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Matched derivations of one attribute, accumulated across affected entries
#[derive(Default)]
struct AttributeMatch<'a> {
    basis: MatchBasis,
    derivations: BTreeMap<(&'a str, &'a str), &'a Derivation>,
    statuses: Vec<VersionStatus>,
}

/// Computes CVE-to-package suggestions for one channel snapshot
///
/// The computation depends only on its two inputs: the same CVE record and
/// channel snapshot always produce the same suggestions in the same order.
#[derive(Debug, Clone)]
pub struct SuggestionBuilder {
    max_matches: usize,
    blob_base_url: String,
}

impl SuggestionBuilder {
    /// Creates a builder
    ///
    /// # Arguments
    /// * `max_matches` - A CVE matching more packages than this in a channel yields nothing for it
    /// * `clone_url` - Source repository URL used to build source position links
    pub fn new(max_matches: usize, clone_url: &str) -> Self {
        let base = clone_url.trim_end_matches('/');
        let base = base.strip_suffix(".git").unwrap_or(base);
        Self {
            max_matches,
            blob_base_url: base.to_string(),
        }
    }

    pub fn max_matches(&self) -> usize {
        self.max_matches
    }

    /// Suggestions for one CVE in one channel, sorted by package attribute
    pub fn suggest(&self, cve: &CveRecord, channel: &ChannelSnapshot) -> Vec<Suggestion> {
        let index = PackageIndex::build(channel);
        self.suggest_indexed(cve, channel, &index)
    }

    /// Suggestions for every CVE in one channel
    ///
    /// Equivalent to concatenating [`SuggestionBuilder::suggest`] over `cves`,
    /// but indexes the snapshot only once.
    pub fn suggest_all(&self, channel: &ChannelSnapshot, cves: &[CveRecord]) -> Vec<Suggestion> {
        let index = PackageIndex::build(channel);
        cves.iter()
            .flat_map(|cve| self.suggest_indexed(cve, channel, &index))
            .collect()
    }

    fn suggest_indexed(
        &self,
        cve: &CveRecord,
        channel: &ChannelSnapshot,
        index: &PackageIndex<'_>,
    ) -> Vec<Suggestion> {
        let mut matches: BTreeMap<&str, AttributeMatch<'_>> = BTreeMap::new();

        for product in &cve.affected {
            let candidates = [
                (product.package_name.as_deref(), MatchBasis::PACKAGE_NAME_MATCH),
                (product.product.as_deref(), MatchBasis::PRODUCT_MATCH),
            ];
            for (name, basis) in candidates {
                let Some(name) = name else { continue };
                for &drv in index.lookup(name) {
                    let entry = matches.entry(drv.attribute.as_str()).or_default();
                    entry.basis.insert(basis);
                    entry
                        .derivations
                        .insert((drv.system.as_str(), drv.drv_path.as_str()), drv);
                    entry.statuses.push(derivation_status(product, drv));
                }
            }
        }

        if matches.len() > self.max_matches {
            tracing::warn!(
                cve = %cve.id,
                channel = %channel.channel,
                matched = matches.len(),
                max_matches = self.max_matches,
                "too many matching packages, skipping suggestions"
            );
            return Vec::new();
        }

        matches
            .into_iter()
            .filter_map(|(attribute, found)| self.build_suggestion(cve, channel, attribute, found))
            .collect()
    }

    fn build_suggestion(
        &self,
        cve: &CveRecord,
        channel: &ChannelSnapshot,
        attribute: &str,
        found: AttributeMatch<'_>,
    ) -> Option<Suggestion> {
        let representative = *found.derivations.values().next()?;
        let status = AffectednessPolicy::combine(found.statuses);

        let systems: Vec<String> = found
            .derivations
            .values()
            .map(|d| d.system.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let payload = SuggestionPayload {
            cve_id: cve.id.to_string(),
            title: cve.title.clone(),
            description: cve.description.clone(),
            severity: cve.severity,
            score: cve.score.map(|s| s.value()),
            channel: channel.channel.to_string(),
            revision: channel.revision.to_string(),
            attribute: attribute.to_string(),
            derivation_name: representative.name.clone(),
            version: parse_drv_name(&representative.name).1.to_string(),
            status,
            systems,
            package_description: representative.description.clone(),
            src_position: representative
                .position
                .as_deref()
                .map(|pos| self.position_url(channel, pos)),
            maintainers: merge_maintainers(found.derivations.values().copied()),
        };

        Some(Suggestion {
            cve_id: cve.id.clone(),
            channel: channel.channel.clone(),
            package: attribute.to_string(),
            match_basis: found.basis,
            status,
            payload,
        })
    }

    /// `pkgs/tools/hello/default.nix:12` -> `<base>/blob/<rev>/pkgs/tools/hello/default.nix#L12`
    fn position_url(&self, channel: &ChannelSnapshot, position: &str) -> String {
        let (path, line) = match position.rsplit_once(':') {
            Some((path, line)) if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) => {
                (path, Some(line))
            }
            _ => (position, None),
        };
        let encoded_path = path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let mut url = format!(
            "{}/blob/{}/{}",
            self.blob_base_url, channel.revision, encoded_path
        );
        if let Some(line) = line {
            url.push_str("#L");
            url.push_str(line);
        }
        url
    }
}

fn derivation_status(product: &AffectedProduct, drv: &Derivation) -> VersionStatus {
    product_status(product, parse_drv_name(&drv.name).1)
}

fn merge_maintainers<'a>(derivations: impl Iterator<Item = &'a Derivation>) -> Vec<Maintainer> {
    let mut by_identity: BTreeMap<String, Maintainer> = BTreeMap::new();
    for drv in derivations {
        for maintainer in &drv.maintainers {
            if let Some(identity) = maintainer.identity() {
                by_identity
                    .entry(identity)
                    .or_insert_with(|| maintainer.clone());
            }
        }
    }
    let mut maintainers: Vec<Maintainer> = by_identity.into_values().collect();
    maintainers.sort();
    maintainers
}
