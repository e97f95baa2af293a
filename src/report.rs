//! Reads Playwright's JSON reporter output and turns specs tagged with
//! TestRail case ids (`C1234`) into results.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::testrail::{ResultStatus, TestResult};

fn case_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\bC(\d+)\b").expect("case id pattern is valid"))
}

#[derive(Deserialize, Debug, Default)]
pub struct PlaywrightReport {
    #[serde(default)]
    suites: Vec<Suite>,
}

#[derive(Deserialize, Debug, Default)]
struct Suite {
    #[serde(default)]
    title: String,
    #[serde(default)]
    specs: Vec<Spec>,
    #[serde(default)]
    suites: Vec<Suite>,
}

#[derive(Deserialize, Debug)]
struct Spec {
    title: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    tests: Vec<SpecTest>,
}

#[derive(Deserialize, Debug)]
struct SpecTest {
    #[serde(default)]
    results: Vec<RunAttempt>,
}

#[derive(Deserialize, Debug)]
struct RunAttempt {
    status: String,
    #[serde(default)]
    duration: u64,
    error: Option<AttemptError>,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Deserialize, Debug)]
struct AttemptError {
    message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Attachment {
    path: Option<PathBuf>,
}

/// One executed spec that maps to at least one TestRail case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedCase {
    pub case_ids: Vec<u64>,
    pub title: String,
    pub status: ResultStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub attachments: Vec<PathBuf>,
}

impl PlaywrightReport {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::Io {
            message: format!("{}: {}", path.display(), e),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::configuration(format!("not a Playwright JSON report: {}", e)))
    }

    /// Specs with a case id in their title or tags. The last retry decides.
    pub fn cases(&self) -> Vec<ReportedCase> {
        let mut cases = Vec::new();
        for suite in &self.suites {
            collect(suite, &mut cases);
        }
        cases
    }
}

fn collect(suite: &Suite, cases: &mut Vec<ReportedCase>) {
    for spec in &suite.specs {
        let labels = std::iter::once(spec.title.as_str()).chain(spec.tags.iter().map(String::as_str));
        let case_ids = case_ids_in(labels);
        if case_ids.is_empty() {
            debug!("no case id in '{} > {}', skipping", suite.title, spec.title);
            continue;
        }
        for test in &spec.tests {
            let Some(attempt) = test.results.last() else {
                continue;
            };
            cases.push(ReportedCase {
                case_ids: case_ids.clone(),
                title: spec.title.clone(),
                status: map_status(&attempt.status),
                duration_ms: attempt.duration,
                error: attempt.error.as_ref().and_then(|e| e.message.clone()),
                attachments: attempt
                    .attachments
                    .iter()
                    .filter_map(|a| a.path.clone())
                    .collect(),
            });
        }
    }
    for child in &suite.suites {
        collect(child, cases);
    }
}

fn case_ids_in<'a>(texts: impl Iterator<Item = &'a str>) -> Vec<u64> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for text in texts {
        for capture in case_id_pattern().captures_iter(text) {
            if let Ok(id) = capture[1].parse::<u64>() {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
        }
    }
    ids
}

/// TestRail rejects status 3 through the API, so skipped specs become Blocked.
fn map_status(status: &str) -> ResultStatus {
    match status {
        "passed" => ResultStatus::Passed,
        "skipped" => ResultStatus::Blocked,
        _ => ResultStatus::Failed,
    }
}

impl ReportedCase {
    pub fn to_results(&self) -> Vec<TestResult> {
        let comment = match (&self.error, self.status) {
            (Some(error), _) => error.clone(),
            (None, ResultStatus::Passed) => "Passed".to_string(),
            (None, status) => format!("{}: {}", status, self.title),
        };
        self.case_ids
            .iter()
            .map(|case_id| {
                TestResult::builder()
                    .case_id(*case_id)
                    .status(self.status)
                    .comment(comment.clone())
                    .elapsed_seconds(self.duration_ms.div_ceil(1000))
                    .attachments(self.attachments.clone())
                    .build()
            })
            .collect()
    }
}

/// Distinct case ids across all cases, in first-seen order.
pub fn distinct_case_ids(cases: &[ReportedCase]) -> Vec<u64> {
    let mut seen = HashSet::new();
    cases
        .iter()
        .flat_map(|case| case.case_ids.iter().copied())
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"{
        "config": {},
        "suites": [{
            "title": "account.spec.ts",
            "specs": [
                {
                    "title": "C101 C102 creates an account",
                    "tests": [{"results": [{"status": "passed", "duration": 1500, "attachments": []}]}]
                },
                {
                    "title": "edits an account",
                    "tags": ["@C103"],
                    "tests": [{"results": [
                        {"status": "failed", "duration": 200, "error": {"message": "first try"}},
                        {"status": "timedOut", "duration": 30000, "error": {"message": "Timeout 30000ms exceeded"},
                         "attachments": [{"name": "screenshot", "path": "/tmp/shot.png"}, {"name": "stdout"}]}
                    ]}]
                },
                {
                    "title": "untracked helper spec",
                    "tests": [{"results": [{"status": "passed", "duration": 1}]}]
                }
            ],
            "suites": [{
                "title": "nested",
                "specs": [{
                    "title": "C104 archived accounts",
                    "tests": [{"results": [{"status": "skipped", "duration": 0}]}]
                }]
            }]
        }]
    }"#;

    #[test]
    fn collects_cases_with_ids() {
        let report = PlaywrightReport::parse(REPORT).unwrap();
        let cases = report.cases();
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].case_ids, vec![101, 102]);
        assert_eq!(cases[1].case_ids, vec![103]);
        assert_eq!(cases[1].status, ResultStatus::Failed);
        assert_eq!(cases[1].error.as_deref(), Some("Timeout 30000ms exceeded"));
        assert_eq!(cases[1].attachments, vec![PathBuf::from("/tmp/shot.png")]);
        assert_eq!(cases[2].status, ResultStatus::Blocked);
        assert_eq!(distinct_case_ids(&cases), vec![101, 102, 103, 104]);
    }

    #[test]
    fn one_result_per_case_id() {
        let report = PlaywrightReport::parse(REPORT).unwrap();
        let results = report.cases()[0].to_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].case_id, 101);
        assert_eq!(results[1].case_id, 102);
        assert_eq!(results[0].comment, "Passed");
        assert_eq!(results[0].elapsed_seconds, Some(2));
    }

    #[test]
    fn case_ids_need_word_boundaries() {
        let ids = case_ids_in(["ABC12 C7 (C8) C9x"].into_iter());
        assert_eq!(ids, vec![7, 8]);
    }

    #[test]
    fn rejects_non_report_json() {
        assert!(matches!(
            PlaywrightReport::parse("[1, 2]"),
            Err(Error::Configuration { .. })
        ));
    }
}
