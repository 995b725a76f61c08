//! JUnit report ingestion

use crate::core::TestSummary;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::warn;

fn testsuite_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<testsuite\s[^>]*>").expect("valid testsuite regex"))
}

fn count_attribute() -> &'static Regex {
    static ATTR: OnceLock<Regex> = OnceLock::new();
    ATTR.get_or_init(|| {
        Regex::new(r#"\b(tests|failures|errors|skipped)="(\d+)""#).expect("valid attribute regex")
    })
}

/// Expand report globs relative to `base`, sorted and de-duplicated
pub fn collect_reports(patterns: &[String], base: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let full = if Path::new(pattern).is_absolute() {
            PathBuf::from(pattern)
        } else {
            base.join(pattern)
        };
        let full = full.to_string_lossy().into_owned();

        match glob::glob(&full) {
            Ok(entries) => paths.extend(entries.filter_map(Result::ok)),
            Err(e) => warn!("Invalid report pattern '{}': {}", pattern, e),
        }
    }
    paths.sort();
    paths.dedup();
    paths
}

/// Sum the counts of every `<testsuite>` element in a report
pub fn summarize_junit(xml: &str) -> TestSummary {
    let mut summary = TestSummary::default();
    for tag in testsuite_tag().find_iter(xml) {
        for caps in count_attribute().captures_iter(tag.as_str()) {
            let value: u64 = caps[2].parse().unwrap_or(0);
            match &caps[1] {
                "tests" => summary.tests += value,
                "failures" => summary.failures += value,
                "errors" => summary.errors += value,
                "skipped" => summary.skipped += value,
                _ => {}
            }
        }
    }
    summary
}

/// Read and summarize report files; unreadable files are logged and skipped
pub async fn summarize_files(paths: &[PathBuf]) -> Option<TestSummary> {
    if paths.is_empty() {
        return None;
    }

    let mut total = TestSummary::default();
    for path in paths {
        match tokio::fs::read_to_string(path).await {
            Ok(xml) => total.merge(summarize_junit(&xml)),
            Err(e) => warn!("Could not read report {}: {}", path.display(), e),
        }
    }
    Some(total)
}

/// Expand a stage's report globs off the runtime threads and summarize the matches
pub async fn gather(patterns: &[String], base: &Path) -> (Vec<PathBuf>, Option<TestSummary>) {
    if patterns.is_empty() {
        return (Vec::new(), None);
    }

    let owned = patterns.to_vec();
    let base = base.to_path_buf();
    let paths = match tokio::task::spawn_blocking(move || collect_reports(&owned, &base)).await {
        Ok(paths) => paths,
        Err(e) => {
            warn!("Report discovery task failed: {}", e);
            Vec::new()
        }
    };
    let tests = summarize_files(&paths).await;
    (paths, tests)
}
