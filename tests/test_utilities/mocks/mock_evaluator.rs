use async_trait::async_trait;
use nix_sectrack::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Mock Evaluator returning canned snapshots per revision
///
/// Unknown revisions evaluate to a single `hello-2.12.1` package.
#[derive(Default)]
pub struct MockEvaluator {
    packages: Mutex<HashMap<String, Vec<(String, String)>>>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl MockEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each evaluation takes at least `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// `(attribute, derivation name)` pairs produced for `revision`
    pub fn with_packages(self, revision: &str, packages: &[(&str, &str)]) -> Self {
        self.packages.lock().unwrap().insert(
            revision.to_string(),
            packages
                .iter()
                .map(|(a, n)| (a.to_string(), n.to_string()))
                .collect(),
        );
        self
    }

    pub fn failing(self, revision: &str) -> Self {
        self.failing.lock().unwrap().insert(revision.to_string());
        self
    }

    /// Evaluations of `revision` never finish
    pub fn hanging(self, revision: &str) -> Self {
        self.hanging.lock().unwrap().insert(revision.to_string());
        self
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn snapshot(&self, revision: &Revision) -> PackageSnapshot {
        let packages = self
            .packages
            .lock()
            .unwrap()
            .get(revision.as_str())
            .cloned()
            .unwrap_or_else(|| vec![("hello".to_string(), "hello-2.12.1".to_string())]);
        PackageSnapshot::new(
            packages
                .into_iter()
                .map(|(attribute, name)| Derivation {
                    drv_path: format!("/nix/store/{}-{}.drv", revision, name),
                    attribute,
                    name,
                    system: "x86_64-linux".to_string(),
                    description: None,
                    position: Some("pkgs/by-name/he/hello/package.nix:34".to_string()),
                    maintainers: Vec::new(),
                })
                .collect(),
        )
    }
}

/// Decrements the running counter even when the evaluation is abandoned
struct Running<'a>(&'a AtomicUsize);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Evaluator for MockEvaluator {
    async fn evaluate(&self, _checkout: &Path, revision: &Revision) -> Result<PackageSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _running = Running(&self.running);

        if self.hanging.lock().unwrap().contains(revision.as_str()) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        tokio::time::sleep(self.delay).await;

        if self.failing.lock().unwrap().contains(revision.as_str()) {
            return Err(TrackerError::EvaluationFailed {
                revision: revision.to_string(),
                details: "error: infinite recursion encountered".to_string(),
            }
            .into());
        }
        Ok(self.snapshot(revision))
    }
}
