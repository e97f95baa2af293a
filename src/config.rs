//! Configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

pub mod defaults {
    pub const SF_LOGIN_URL: &str = "https://login.salesforce.com";
    pub const SF_API_VERSION: &str = "60.0";
    /// Salesforce does not report token lifetime on the password grant.
    pub const SF_SESSION_LIFETIME_SECS: u64 = 2 * 60 * 60;
}

/// Connection settings for the TestRail backend.
#[derive(Debug, Clone)]
pub struct TestRailConfig {
    /// e.g. `https://acme.testrail.io`, without the `index.php` suffix
    pub base_url: String,
    pub username: String,
    /// API key, or the account password
    pub api_key: String,
    pub project_id: u64,
    /// Only needed for multi-suite projects
    pub suite_id: Option<u64>,
}

impl TestRailConfig {
    /// Reads `TESTRAIL_URL`, `TESTRAIL_USERNAME`, `TESTRAIL_API_KEY` (or
    /// `TESTRAIL_PASSWORD`), `TESTRAIL_PROJECT_ID` and optional `TESTRAIL_SUITE_ID`.
    pub fn from_env() -> Result<Self> {
        let mut missing = Vec::new();
        let base_url = required("TESTRAIL_URL", &mut missing);
        let username = required("TESTRAIL_USERNAME", &mut missing);
        let api_key = optional("TESTRAIL_API_KEY").or_else(|| optional("TESTRAIL_PASSWORD"));
        if api_key.is_none() {
            missing.push("TESTRAIL_API_KEY");
        }
        let project_id = required("TESTRAIL_PROJECT_ID", &mut missing);
        if !missing.is_empty() {
            return Err(missing_vars(&missing));
        }

        Ok(Self {
            base_url: base_url.unwrap_or_default().trim_end_matches('/').to_string(),
            username: username.unwrap_or_default(),
            api_key: api_key.unwrap_or_default(),
            project_id: parse_id("TESTRAIL_PROJECT_ID", &project_id.unwrap_or_default())?,
            suite_id: optional("TESTRAIL_SUITE_ID")
                .map(|v| parse_id("TESTRAIL_SUITE_ID", &v))
                .transpose()?,
        })
    }

    /// `{base_url}/index.php?/api/v2/{path}`
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/index.php?/api/v2/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Salesforce org login settings.
#[derive(Debug, Clone)]
pub struct SalesforceConfig {
    pub login_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub security_token: Option<String>,
    pub api_version: String,
    /// Pre-issued session used when the password grant fails.
    pub session_id: Option<String>,
    pub instance_url: Option<String>,
    pub session_lifetime: Duration,
}

impl SalesforceConfig {
    pub fn from_env() -> Result<Self> {
        let mut missing = Vec::new();
        let client_id = required("SF_CLIENT_ID", &mut missing);
        let client_secret = required("SF_CLIENT_SECRET", &mut missing);
        let username = required("SF_USERNAME", &mut missing);
        let password = required("SF_PASSWORD", &mut missing);
        if !missing.is_empty() {
            return Err(missing_vars(&missing));
        }

        Ok(Self {
            login_url: optional("SF_LOGIN_URL")
                .unwrap_or_else(|| defaults::SF_LOGIN_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client_id: client_id.unwrap_or_default(),
            client_secret: client_secret.unwrap_or_default(),
            username: username.unwrap_or_default(),
            password: password.unwrap_or_default(),
            security_token: optional("SF_SECURITY_TOKEN"),
            api_version: optional("SF_API_VERSION")
                .unwrap_or_else(|| defaults::SF_API_VERSION.to_string()),
            session_id: optional("SF_SESSION_ID"),
            instance_url: optional("SF_INSTANCE_URL"),
            session_lifetime: Duration::from_secs(defaults::SF_SESSION_LIFETIME_SECS),
        })
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str, missing: &mut Vec<&'static str>) -> Option<String> {
    let value = optional(name);
    if value.is_none() {
        missing.push(name);
    }
    value
}

fn missing_vars(names: &[&str]) -> Error {
    Error::configuration(format!("missing environment variables: {}", names.join(", ")))
}

fn parse_id(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .trim_start_matches(['P', 'S', 'p', 's'])
        .parse()
        .map_err(|_| Error::configuration(format!("{} is not a numeric id: {}", name, value)))
}
