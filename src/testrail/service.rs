use std::collections::{HashMap, VecDeque};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::TestRailConfig;
use crate::error::{Error, Result};
use crate::http::{
    basic_auth_header, ApiClient, Endpoint, FilePart, HttpMethod, HttpRequest, HttpResult,
    ReqBody, ReqParam,
};
use crate::testrail::model::{
    AddResultsRequest, AddRunRequest, CreatedRun, Listing, ResultRecord, ResultStatus, RunState,
    TestRecord, TestResult, TestRun, UploadedResult,
};

const ATTACHMENT_FIELD: &str = "attachment";

/// Owns one TestRail run from creation to close.
///
/// Every mutating call takes `&mut self`, so a run shared by several tests
/// has to be driven from one place (suites run serially).
pub struct TestRailClient {
    api_client: ApiClient,
    config: TestRailConfig,
    run: TestRun,
}

impl TestRailClient {
    pub fn new(config: TestRailConfig) -> Self {
        Self::with_api_client(config, ApiClient::new())
    }

    pub fn with_api_client(config: TestRailConfig, api_client: ApiClient) -> Self {
        Self {
            api_client,
            config,
            run: TestRun::new(),
        }
    }

    pub fn run_id(&self) -> Option<u64> {
        self.run.run_id
    }

    pub fn run_name(&self) -> Option<&str> {
        self.run.name.as_deref()
    }

    pub fn state(&self) -> RunState {
        self.run.state
    }

    pub fn case_ids(&self) -> &[u64] {
        &self.run.case_ids
    }

    /// Results added since the last successful upload.
    pub fn pending_results(&self) -> &[TestResult] {
        &self.run.results
    }

    /// Creates the run on the backend. Failures are returned as is; a run id
    /// is only ever assigned once.
    pub async fn create_run(&mut self, name: &str, case_ids: Vec<u64>) -> Result<u64> {
        if let Some(run_id) = self.run.run_id {
            return Err(Error::precondition(format!(
                "run {} already created, runs are not re-created",
                run_id
            )));
        }

        let request = AddRunRequest {
            name: name.to_string(),
            suite_id: self.config.suite_id,
            include_all: false,
            case_ids: case_ids.clone(),
        };
        let response = self
            .send(
                HttpMethod::POST,
                self.config.api_url(&format!("add_run/{}", self.config.project_id)),
                json_body(&request)?,
            )
            .await?;
        let created: CreatedRun = serde_json::from_value(response.body)
            .map_err(|e| Error::invalid_response(format!("add_run: {}", e)))?;

        info!("created TestRail run {} ({}) with {} cases", created.id, name, case_ids.len());
        self.run.run_id = Some(created.id);
        self.run.name = Some(name.to_string());
        self.run.case_ids = case_ids;
        self.run.state = RunState::Created;
        Ok(created.id)
    }

    /// Buffers a result locally; nothing is sent until [`Self::upload_results`].
    pub fn add_result(
        &mut self,
        case_id: u64,
        status: ResultStatus,
        comment: impl Into<String>,
        elapsed_seconds: Option<u64>,
    ) -> Result<()> {
        self.push_result(
            TestResult::builder()
                .case_id(case_id)
                .status(status)
                .comment(comment)
                .maybe_elapsed_seconds(elapsed_seconds)
                .build(),
        )
    }

    /// Duplicate case ids are kept; the backend receives every entry.
    pub fn push_result(&mut self, result: TestResult) -> Result<()> {
        if self.run.state == RunState::Closed {
            return Err(Error::precondition(format!(
                "run {} is closed, cannot add result for case {}",
                self.run.run_id.unwrap_or_default(),
                result.case_id
            )));
        }
        debug!("buffered {} result for case {}", result.status, result.case_id);
        self.run.results.push(result);
        Ok(())
    }

    /// Sends all buffered results in one call, then uploads their attachments.
    ///
    /// Returns one entry per uploaded result, in insertion order. Once the batch
    /// call succeeds the upload counts as done: an id that cannot be recovered is
    /// logged and left as `None`, and that result's attachments are skipped.
    pub async fn upload_results(&mut self) -> Result<Vec<UploadedResult>> {
        let run_id = self.require_open_run("upload results")?;
        if self.run.results.is_empty() {
            info!("no results to upload for run {}", run_id);
            return Ok(vec![]);
        }

        let request = AddResultsRequest {
            results: self.run.results.iter().map(TestResult::to_entry).collect(),
        };
        let response = self
            .send(
                HttpMethod::POST,
                self.config.api_url(&format!("add_results_for_cases/{}", run_id)),
                json_body(&request)?,
            )
            .await?;

        let uploaded = std::mem::take(&mut self.run.results);
        self.run.state = RunState::Uploaded;
        info!("uploaded {} results to run {}", uploaded.len(), run_id);

        let result_ids: Vec<Option<u64>> = match result_ids_from_response(&response.body, uploaded.len()) {
            Some(ids) => ids.into_iter().map(Some).collect(),
            None => {
                warn!(
                    "add_results_for_cases response for run {} carried no result ids, looking them up",
                    run_id
                );
                match self.lookup_result_ids(run_id, &uploaded).await {
                    Ok(ids) => ids,
                    Err(err) => {
                        warn!("result id lookup failed for run {}: {}", run_id, err);
                        vec![None; uploaded.len()]
                    }
                }
            }
        };

        let uploaded_results: Vec<UploadedResult> = uploaded
            .iter()
            .zip(result_ids)
            .map(|(result, result_id)| UploadedResult {
                case_id: result.case_id,
                result_id,
            })
            .collect();

        for (result, ids) in uploaded.iter().zip(&uploaded_results) {
            if result.attachments.is_empty() {
                continue;
            }
            let Some(result_id) = ids.result_id else {
                warn!(
                    "skipping {} attachments for case {} in run {}: no result id",
                    result.attachments.len(),
                    result.case_id,
                    run_id
                );
                continue;
            };
            for path in &result.attachments {
                self.upload_attachment(result_id, path).await;
            }
        }
        Ok(uploaded_results)
    }

    /// Best effort: a missing file or a failed upload is logged and skipped.
    /// Returns the attachment id on success.
    pub async fn upload_attachment(&self, result_id: u64, path: impl AsRef<Path>) -> Option<u64> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    "skipping attachment {} for result {}: {}",
                    path.display(),
                    result_id,
                    err
                );
                return None;
            }
        };
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| ATTACHMENT_FIELD.to_string());

        let body = ReqBody::File(FilePart {
            field: ATTACHMENT_FIELD.to_string(),
            file_name,
            bytes,
        });
        let url = self
            .config
            .api_url(&format!("add_attachment_to_result/{}", result_id));
        match self.send(HttpMethod::POST, url, body).await {
            Ok(response) => {
                let attachment_id = response
                    .body
                    .get("attachment_id")
                    .or_else(|| response.body.get("id"))
                    .and_then(Value::as_u64);
                debug!("attached {} to result {}", path.display(), result_id);
                attachment_id
            }
            Err(err) => {
                warn!(
                    "add_attachment_to_result failed for result {} ({}): {}",
                    result_id,
                    path.display(),
                    err
                );
                None
            }
        }
    }

    /// Closes the run. Without a run this does nothing; failures are logged,
    /// never returned, so teardown hooks cannot mask test outcomes.
    pub async fn close_run(&mut self) {
        let Some(run_id) = self.run.run_id else {
            debug!("no TestRail run to close");
            return;
        };
        if self.run.state == RunState::Closed {
            debug!("run {} already closed", run_id);
            return;
        }

        let url = self.config.api_url(&format!("close_run/{}", run_id));
        match self.send(HttpMethod::POST, url, ReqBody::empty()).await {
            Ok(_) => {
                info!("closed TestRail run {}", run_id);
                self.run.state = RunState::Closed;
            }
            Err(err) => warn!("close_run failed for run {}: {}", run_id, err),
        }
    }

    fn require_open_run(&self, operation: &str) -> Result<u64> {
        let run_id = self
            .run
            .run_id
            .ok_or_else(|| Error::precondition(format!("cannot {} before a run is created", operation)))?;
        if self.run.state == RunState::Closed {
            return Err(Error::precondition(format!(
                "cannot {}, run {} is closed",
                operation, run_id
            )));
        }
        Ok(run_id)
    }

    /// Recovers result ids from the run's tests and results. For every case the
    /// newest results belong to the batch just sent. Cases without a match get `None`.
    async fn lookup_result_ids(
        &self,
        run_id: u64,
        uploaded: &[TestResult],
    ) -> Result<Vec<Option<u64>>> {
        let tests: Vec<TestRecord> = self.list_all(&format!("get_tests/{}", run_id)).await?;
        let case_by_test: HashMap<u64, u64> = tests
            .into_iter()
            .filter_map(|test| test.case_id.map(|case_id| (test.id, case_id)))
            .collect();

        let records: Vec<ResultRecord> = self
            .list_all(&format!("get_results_for_run/{}", run_id))
            .await?;
        let mut by_case: HashMap<u64, Vec<u64>> = HashMap::new();
        for record in records {
            if let (Some(id), Some(test_id)) = (record.id, record.test_id) {
                if let Some(case_id) = case_by_test.get(&test_id) {
                    by_case.entry(*case_id).or_default().push(id);
                }
            }
        }

        let mut wanted: HashMap<u64, usize> = HashMap::new();
        for result in uploaded {
            *wanted.entry(result.case_id).or_default() += 1;
        }
        let mut queues: HashMap<u64, VecDeque<u64>> = by_case
            .into_iter()
            .map(|(case_id, mut ids)| {
                ids.sort_unstable_by(|a, b| b.cmp(a));
                ids.truncate(wanted.get(&case_id).copied().unwrap_or(0));
                ids.reverse();
                (case_id, VecDeque::from(ids))
            })
            .collect();

        let ids = uploaded
            .iter()
            .map(|result| {
                let id = queues.get_mut(&result.case_id).and_then(VecDeque::pop_front);
                if id.is_none() {
                    warn!("no result id found for case {} in run {}", result.case_id, run_id);
                }
                id
            })
            .collect();
        Ok(ids)
    }

    /// GETs a listing endpoint, following `_links.next` pages.
    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut url = self.config.api_url(path);
        let mut items = Vec::new();
        loop {
            let response = self.send(HttpMethod::GET, url, ReqBody::empty()).await?;
            let listing: Listing<T> = serde_json::from_value(response.body)
                .map_err(|e| Error::invalid_response(format!("{}: {}", path, e)))?;
            let (page, next) = listing.into_parts();
            let page_len = page.len();
            items.extend(page);
            match next {
                Some(next) if !next.is_empty() && page_len > 0 => {
                    url = format!("{}/index.php?{}", self.config.base_url, next);
                }
                _ => break,
            }
        }
        Ok(items)
    }

    async fn send(&self, method: HttpMethod, url: String, body: ReqBody) -> Result<HttpResult> {
        let mut endpoint = Endpoint::new(method, url)
            .with_header(basic_auth_header(&self.config.username, &self.config.api_key));
        if method == HttpMethod::POST && matches!(body, ReqBody::Empty) {
            endpoint = endpoint.with_header(ReqParam::new("Content-Type", "application/json"));
        }
        Ok(self
            .api_client
            .execute(HttpRequest::new(endpoint, body))
            .await?)
    }
}

fn json_body<T: Serialize>(body: &T) -> Result<ReqBody> {
    serde_json::to_value(body)
        .map(ReqBody::json)
        .map_err(|e| Error::configuration(format!("unserializable request body: {}", e)))
}

/// Positional result ids from an `add_results_for_cases` response, if the
/// response has one id per submitted entry.
fn result_ids_from_response(body: &Value, expected: usize) -> Option<Vec<u64>> {
    let records: Vec<ResultRecord> = serde_json::from_value(body.clone()).ok()?;
    if records.len() != expected {
        return None;
    }
    records.into_iter().map(|record| record.id).collect()
}
