use crate::shared::error::TrackerError;
use crate::shared::Result;
use crate::tracking::domain::{
    AffectedProduct, CveId, CveRecord, CvssScore, Severity, VersionConstraint, VersionStatus,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

/// Parses a CVE JSON 5 record document into the domain model
///
/// `origin` names the document (file path, URL) in error messages.
///
/// # Errors
/// Returns `TrackerError::MalformedRecord` when the document is not valid
/// JSON, lacks an identifier or modification date, or carries values that
/// fail domain validation.
pub fn parse_cve_record(origin: &str, content: &str) -> Result<CveRecord> {
    let malformed = |reason: String| TrackerError::MalformedRecord {
        record: origin.to_string(),
        reason,
    };

    let doc: CveDocument =
        serde_json::from_str(content).map_err(|e| malformed(format!("invalid JSON: {}", e)))?;

    let id = CveId::new(doc.cve_metadata.cve_id.clone()).map_err(|e| malformed(e.to_string()))?;

    let published = doc
        .cve_metadata
        .date_published
        .as_deref()
        .map(parse_timestamp)
        .transpose()
        .map_err(|e| malformed(e.to_string()))?;

    let last_modified = match doc.cve_metadata.date_updated.as_deref() {
        Some(raw) => Some(parse_timestamp(raw).map_err(|e| malformed(e.to_string()))?),
        None => published,
    }
    .ok_or_else(|| malformed("missing cveMetadata.dateUpdated".to_string()))?;

    let cna = doc.containers.cna;
    let description = pick_english(&cna.descriptions)
        .or_else(|| pick_english(&cna.rejected_reasons))
        .unwrap_or_default();

    let metrics: Vec<&CveMetric> = cna
        .metrics
        .iter()
        .chain(doc.containers.adp.iter().flat_map(|a| a.metrics.iter()))
        .collect();
    let (score, severity) = pick_metric(&metrics);

    let affected = cna
        .affected
        .iter()
        .map(convert_affected)
        .collect::<Vec<_>>();

    Ok(CveRecord {
        id,
        published,
        last_modified,
        title: cna.title.filter(|t| !t.trim().is_empty()),
        description,
        severity,
        score,
        affected,
    })
}

/// Timestamps in the CVE list come both with and without a zone suffix;
/// zone-less values are UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| anyhow::anyhow!("invalid timestamp '{}': {}", raw, e))
}

fn pick_english(entries: &[LangString]) -> Option<String> {
    entries
        .iter()
        .find(|d| d.lang.to_lowercase().starts_with("en"))
        .or_else(|| entries.first())
        .map(|d| d.value.trim().to_string())
}

/// Picks the most recent CVSS flavour available: v4.0, v3.1, v3.0, v2.0
fn pick_metric(metrics: &[&CveMetric]) -> (Option<CvssScore>, Severity) {
    const FLAVOURS: [fn(&CveMetric) -> Option<&CvssData>; 4] = [
        |m| m.cvss_v4_0.as_ref(),
        |m| m.cvss_v3_1.as_ref(),
        |m| m.cvss_v3_0.as_ref(),
        |m| m.cvss_v2_0.as_ref(),
    ];
    for flavour in FLAVOURS {
        if let Some(cvss) = metrics.iter().find_map(|m| flavour(m)) {
            let score = cvss.base_score.and_then(|s| CvssScore::new(s).ok());
            let severity = match (score, cvss.base_severity.as_deref()) {
                (_, Some(raw)) if Severity::parse_lenient(raw) != Severity::None => {
                    Severity::parse_lenient(raw)
                }
                (Some(score), _) => Severity::from_cvss_score(score),
                _ => Severity::None,
            };
            return (score, severity);
        }
    }
    (None, Severity::None)
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "n/a")
        .map(str::to_string)
}

fn convert_affected(raw: &CveAffected) -> AffectedProduct {
    AffectedProduct {
        vendor: non_blank(&raw.vendor),
        product: non_blank(&raw.product),
        package_name: non_blank(&raw.package_name),
        default_status: raw
            .default_status
            .as_deref()
            .map(VersionStatus::parse_lenient)
            .unwrap_or(VersionStatus::Unknown),
        versions: raw
            .versions
            .iter()
            .map(|v| VersionConstraint {
                status: VersionStatus::parse_lenient(&v.status),
                version: v.version.clone(),
                less_than: v.less_than.clone(),
                less_than_or_equal: v.less_than_or_equal.clone(),
            })
            .collect(),
    }
}

// CVE JSON 5 record structures (only the fields the tracker uses)

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CveDocument {
    cve_metadata: CveMetadata,
    #[serde(default)]
    containers: CveContainers,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CveMetadata {
    cve_id: String,
    #[serde(default)]
    date_published: Option<String>,
    #[serde(default)]
    date_updated: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CveContainers {
    #[serde(default)]
    cna: CnaContainer,
    #[serde(default)]
    adp: Vec<AdpContainer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CnaContainer {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    descriptions: Vec<LangString>,
    #[serde(default)]
    rejected_reasons: Vec<LangString>,
    #[serde(default)]
    affected: Vec<CveAffected>,
    #[serde(default)]
    metrics: Vec<CveMetric>,
}

#[derive(Debug, Default, Deserialize)]
struct AdpContainer {
    #[serde(default)]
    metrics: Vec<CveMetric>,
}

#[derive(Debug, Deserialize)]
struct LangString {
    #[serde(default)]
    lang: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CveAffected {
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    product: Option<String>,
    #[serde(default)]
    package_name: Option<String>,
    #[serde(default)]
    default_status: Option<String>,
    #[serde(default)]
    versions: Vec<CveVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CveVersion {
    version: String,
    status: String,
    #[serde(default)]
    less_than: Option<String>,
    #[serde(default)]
    less_than_or_equal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CveMetric {
    #[serde(default, rename = "cvssV4_0")]
    cvss_v4_0: Option<CvssData>,
    #[serde(default, rename = "cvssV3_1")]
    cvss_v3_1: Option<CvssData>,
    #[serde(default, rename = "cvssV3_0")]
    cvss_v3_0: Option<CvssData>,
    #[serde(default, rename = "cvssV2_0")]
    cvss_v2_0: Option<CvssData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssData {
    #[serde(default)]
    base_score: Option<f32>,
    #[serde(default)]
    base_severity: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const LOG4SHELL: &str = r#"{
        "dataType": "CVE_RECORD",
        "dataVersion": "5.1",
        "cveMetadata": {
            "cveId": "CVE-2021-44228",
            "state": "PUBLISHED",
            "datePublished": "2021-12-10T00:00:00.000Z",
            "dateUpdated": "2024-08-04T04:14:00.000Z"
        },
        "containers": {
            "cna": {
                "title": "Apache Log4j2 JNDI features do not protect against attacker controlled LDAP",
                "descriptions": [
                    {"lang": "es", "value": "Descripción"},
                    {"lang": "en", "value": "Apache Log4j2 2.0-beta9 through 2.15.0 ..."}
                ],
                "affected": [
                    {
                        "vendor": "Apache Software Foundation",
                        "product": "Apache Log4j2",
                        "packageName": "log4j",
                        "defaultStatus": "unaffected",
                        "versions": [
                            {"version": "2.0-beta9", "lessThan": "2.3.1", "status": "affected", "versionType": "maven"},
                            {"version": "2.4", "lessThanOrEqual": "2.12.1", "status": "affected"}
                        ]
                    }
                ],
                "metrics": [
                    {"other": {"type": "unknown"}},
                    {"cvssV3_1": {"baseScore": 10.0, "baseSeverity": "CRITICAL"}}
                ]
            }
        }
    }"#;

    #[test]
    fn test_parse_full_record() {
        let record = parse_cve_record("CVE-2021-44228.json", LOG4SHELL).unwrap();
        assert_eq!(record.id.as_str(), "CVE-2021-44228");
        assert_eq!(
            record.last_modified,
            Utc.with_ymd_and_hms(2024, 8, 4, 4, 14, 0).unwrap()
        );
        assert!(record.published.is_some());
        assert!(record.description.starts_with("Apache Log4j2"));
        assert_eq!(record.severity, Severity::Critical);
        assert_eq!(record.score.unwrap().value(), 10.0);
        assert_eq!(record.affected.len(), 1);

        let product = &record.affected[0];
        assert_eq!(product.package_name.as_deref(), Some("log4j"));
        assert_eq!(product.default_status, VersionStatus::Unaffected);
        assert_eq!(product.versions.len(), 2);
        assert_eq!(product.versions[0].less_than.as_deref(), Some("2.3.1"));
        assert_eq!(
            product.versions[1].less_than_or_equal.as_deref(),
            Some("2.12.1")
        );
    }

    #[test]
    fn test_zone_less_timestamps_are_utc() {
        let doc = r#"{"cveMetadata": {"cveId": "CVE-2024-0001", "dateUpdated": "2024-03-01T12:30:00"}}"#;
        let record = parse_cve_record("x", doc).unwrap();
        assert_eq!(
            record.last_modified,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
        );
        assert!(record.affected.is_empty());
        assert_eq!(record.severity, Severity::None);
    }

    #[test]
    fn test_date_published_is_fallback_for_last_modified() {
        let doc = r#"{"cveMetadata": {"cveId": "CVE-2024-0002", "datePublished": "2024-01-01T00:00:00Z"}}"#;
        let record = parse_cve_record("x", doc).unwrap();
        assert_eq!(record.published, Some(record.last_modified));
    }

    #[test]
    fn test_missing_dates_are_malformed() {
        let doc = r#"{"cveMetadata": {"cveId": "CVE-2024-0003"}}"#;
        let err = parse_cve_record("CVE-2024-0003.json", doc).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("CVE-2024-0003.json"));
        assert!(msg.contains("dateUpdated"));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = parse_cve_record("broken.json", "{ nope").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_invalid_identifier_is_malformed() {
        let doc = r#"{"cveMetadata": {"cveId": "GHSA-xxxx", "dateUpdated": "2024-01-01T00:00:00Z"}}"#;
        assert!(parse_cve_record("x", doc).is_err());
    }

    #[test]
    fn test_rejected_record_uses_rejection_reason() {
        let doc = r#"{
            "cveMetadata": {"cveId": "CVE-2024-0004", "state": "REJECTED", "dateUpdated": "2024-01-01T00:00:00Z"},
            "containers": {"cna": {"rejectedReasons": [{"lang": "en", "value": "Duplicate of CVE-2024-0001"}]}}
        }"#;
        let record = parse_cve_record("x", doc).unwrap();
        assert_eq!(record.description, "Duplicate of CVE-2024-0001");
    }

    #[test]
    fn test_adp_metrics_and_score_derived_severity() {
        let doc = r#"{
            "cveMetadata": {"cveId": "CVE-2024-0005", "dateUpdated": "2024-01-01T00:00:00Z"},
            "containers": {
                "cna": {"affected": [{"product": "n/a", "packageName": " zlib "}]},
                "adp": [{"metrics": [{"cvssV3_1": {"baseScore": 7.5}}]}]
            }
        }"#;
        let record = parse_cve_record("x", doc).unwrap();
        assert_eq!(record.severity, Severity::High);
        assert_eq!(record.affected[0].product, None);
        assert_eq!(record.affected[0].package_name.as_deref(), Some("zlib"));
    }
}
