use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use nix_sectrack::prelude::*;
use std::sync::Mutex;

/// Builds a CVE JSON 5 document affecting `product` below `less_than`
/// (every version when `None`)
pub fn cve_document(id: &str, updated: &str, product: &str, less_than: Option<&str>) -> RawCveDocument {
    let versions = match less_than {
        Some(bound) => format!(
            r#"[{{"version": "0", "lessThan": "{}", "status": "affected", "versionType": "semver"}}]"#,
            bound
        ),
        None => r#"[{"version": "*", "status": "affected"}]"#.to_string(),
    };
    RawCveDocument {
        origin: format!("cves/{}.json", id),
        content: format!(
            r#"{{
                "dataType": "CVE_RECORD",
                "dataVersion": "5.1",
                "cveMetadata": {{
                    "cveId": "{id}",
                    "state": "PUBLISHED",
                    "datePublished": "2024-01-01T00:00:00.000Z",
                    "dateUpdated": "{updated}"
                }},
                "containers": {{
                    "cna": {{
                        "title": "Flaw in {product}",
                        "descriptions": [{{"lang": "en", "value": "A flaw was found in {product}."}}],
                        "affected": [{{
                            "vendor": "upstream",
                            "product": "{product}",
                            "defaultStatus": "unaffected",
                            "versions": {versions}
                        }}],
                        "metrics": [{{"cvssV3_1": {{"baseScore": 7.5, "baseSeverity": "HIGH"}}}}]
                    }}
                }}
            }}"#
        ),
    }
}

/// Mock CveFeed serving an in-memory corpus
///
/// Delta fetches honor the checkpoint using each document's `dateUpdated`.
#[derive(Default)]
pub struct MockCveFeed {
    documents: Mutex<Vec<(DateTime<Utc>, RawCveDocument)>>,
}

impl MockCveFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, document: RawCveDocument) -> Self {
        self.push(document);
        self
    }

    /// Adds or replaces (by origin) a document
    pub fn push(&self, document: RawCveDocument) {
        let record = parse_cve_record(&document.origin, &document.content)
            .expect("mock documents must parse");
        let mut documents = self.documents.lock().unwrap();
        documents.retain(|(_, d)| d.origin != document.origin);
        documents.push((record.last_modified, document));
    }
}

/// Splits `documents` into a stream of chunks of at most `chunk_size`
fn chunked(documents: Vec<RawCveDocument>, chunk_size: usize) -> CveDocumentStream {
    let chunks: Vec<Result<Vec<RawCveDocument>>> = documents
        .chunks(chunk_size.max(1))
        .map(|chunk| Ok(chunk.to_vec()))
        .collect();
    futures::stream::iter(chunks).boxed()
}

#[async_trait]
impl CveFeed for MockCveFeed {
    async fn fetch_all(
        &self,
        limit: Option<usize>,
        chunk_size: usize,
    ) -> Result<CveDocumentStream> {
        let documents = self.documents.lock().unwrap();
        let n = limit.unwrap_or(documents.len());
        let selected = documents.iter().take(n).map(|(_, d)| d.clone()).collect();
        Ok(chunked(selected, chunk_size))
    }

    async fn fetch_changed_since(
        &self,
        since: Option<DateTime<Utc>>,
        chunk_size: usize,
    ) -> Result<CveDocumentStream> {
        let selected = self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|(modified, _)| since.map_or(true, |since| *modified >= since))
            .map(|(_, d)| d.clone())
            .collect();
        Ok(chunked(selected, chunk_size))
    }
}
