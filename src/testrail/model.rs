use std::fmt;
use std::path::PathBuf;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// TestRail's fixed status ids.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[serde(into = "u8", try_from = "u8")]
pub enum ResultStatus {
    Passed,
    Blocked,
    Untested,
    Retest,
    Failed,
}

impl ResultStatus {
    pub fn id(self) -> u8 {
        match self {
            ResultStatus::Passed => 1,
            ResultStatus::Blocked => 2,
            ResultStatus::Untested => 3,
            ResultStatus::Retest => 4,
            ResultStatus::Failed => 5,
        }
    }
}

impl From<ResultStatus> for u8 {
    fn from(status: ResultStatus) -> Self {
        status.id()
    }
}

impl TryFrom<u8> for ResultStatus {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ResultStatus::Passed),
            2 => Ok(ResultStatus::Blocked),
            3 => Ok(ResultStatus::Untested),
            4 => Ok(ResultStatus::Retest),
            5 => Ok(ResultStatus::Failed),
            other => Err(Error::configuration(format!("unknown status id {}", other))),
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultStatus::Passed => "passed",
            ResultStatus::Blocked => "blocked",
            ResultStatus::Untested => "untested",
            ResultStatus::Retest => "retest",
            ResultStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// One execution outcome waiting to be uploaded.
#[derive(Clone, Debug, Eq, PartialEq, Builder)]
pub struct TestResult {
    pub case_id: u64,
    pub status: ResultStatus,
    #[builder(default, into)]
    pub comment: String,
    pub elapsed_seconds: Option<u64>,
    /// Uploaded after the result batch succeeds.
    #[builder(default)]
    pub attachments: Vec<PathBuf>,
}

impl TestResult {
    pub(crate) fn to_entry(&self) -> ResultEntry {
        ResultEntry {
            case_id: self.case_id,
            status_id: self.status.id(),
            comment: self.comment.clone(),
            elapsed: self
                .elapsed_seconds
                .filter(|secs| *secs > 0)
                .map(|secs| format!("{}s", secs)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    Uninitialized,
    Created,
    Uploaded,
    Closed,
}

/// Local view of one backend run.
#[derive(Clone, Debug)]
pub struct TestRun {
    pub(crate) run_id: Option<u64>,
    pub(crate) name: Option<String>,
    pub(crate) case_ids: Vec<u64>,
    pub(crate) results: Vec<TestResult>,
    pub(crate) state: RunState,
}

impl TestRun {
    pub(crate) fn new() -> Self {
        Self {
            run_id: None,
            name: None,
            case_ids: vec![],
            results: vec![],
            state: RunState::Uninitialized,
        }
    }
}

/// Result id assigned by the backend to an uploaded result. `None` when the
/// backend did not report it and the lookup could not recover it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct UploadedResult {
    pub case_id: u64,
    pub result_id: Option<u64>,
}

#[derive(Serialize, Debug)]
pub(crate) struct AddRunRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_id: Option<u64>,
    pub include_all: bool,
    pub case_ids: Vec<u64>,
}

#[derive(Serialize, Debug)]
pub(crate) struct AddResultsRequest {
    pub results: Vec<ResultEntry>,
}

#[derive(Serialize, Debug, Eq, PartialEq)]
pub(crate) struct ResultEntry {
    pub case_id: u64,
    pub status_id: u8,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CreatedRun {
    pub id: u64,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ResultRecord {
    pub id: Option<u64>,
    pub test_id: Option<u64>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct TestRecord {
    pub id: u64,
    pub case_id: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct Links {
    pub next: Option<String>,
}

/// Older TestRail versions return bare arrays, newer ones a page object.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub(crate) enum Listing<T> {
    Page {
        #[serde(alias = "tests", alias = "results")]
        items: Vec<T>,
        #[serde(rename = "_links", default)]
        links: Links,
    },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    pub fn into_parts(self) -> (Vec<T>, Option<String>) {
        match self {
            Listing::Page { items, links } => (items, links.next),
            Listing::Bare(items) => (items, None),
        }
    }
}
