use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::http::{bearer_auth_header, Endpoint, HttpMethod, HttpRequest, ReqBody};
use crate::query::Query;
use crate::salesforce::auth::AuthContext;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryPage {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    records: Vec<Value>,
    next_records_url: Option<String>,
}

/// Runs SOQL against the REST query resource.
pub struct QueryExecutor {
    auth: AuthContext,
}

impl QueryExecutor {
    pub fn new(auth: AuthContext) -> Self {
        Self { auth }
    }

    pub fn auth_mut(&mut self) -> &mut AuthContext {
        &mut self.auth
    }

    pub async fn execute(&mut self, query: &Query) -> Result<Vec<Value>> {
        let soql = query.build()?;
        self.query(&soql).await
    }

    /// Returns every row, following `nextRecordsUrl` until the result is done.
    pub async fn query(&mut self, soql: &str) -> Result<Vec<Value>> {
        let result = self.fetch_all(soql).await;
        if let Err(Error::Backend { status: 401, .. }) = &result {
            self.auth.invalidate();
        }
        result
    }

    async fn fetch_all(&mut self, soql: &str) -> Result<Vec<Value>> {
        let token = self.auth.token().await?.clone();
        let api_client = self.auth.api_client();
        debug!("SOQL: {}", soql);

        let mut endpoint = Endpoint::new(
            HttpMethod::GET,
            format!(
                "{}/services/data/v{}/query",
                token.instance_url,
                self.auth.config().api_version
            ),
        )
        .with_query_param("q", soql);
        let mut records = Vec::new();
        loop {
            let response = api_client
                .execute(HttpRequest::new(
                    endpoint.with_header(bearer_auth_header(&token.access_token)),
                    ReqBody::empty(),
                ))
                .await?;
            let page: QueryPage = serde_json::from_value(response.body)
                .map_err(|e| Error::invalid_response(format!("query: {}", e)))?;
            records.extend(page.records);
            match page.next_records_url {
                Some(next) if !page.done => {
                    endpoint = Endpoint::new(HttpMethod::GET, format!("{}{}", token.instance_url, next));
                }
                _ => break,
            }
        }
        info!("query returned {} rows", records.len());
        Ok(records)
    }
}
