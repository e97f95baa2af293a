use std::time::SystemTime;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::SalesforceConfig;
use crate::error::{Error, Result};
use crate::http::{ApiClient, Endpoint, HttpMethod, HttpRequest, ReqBody, ReqParam};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub instance_url: String,
    pub expires_at: SystemTime,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    instance_url: String,
}

/// Holds the org credentials and the current token. Passed explicitly to
/// whatever needs an authenticated session.
pub struct AuthContext {
    api_client: ApiClient,
    config: SalesforceConfig,
    token: Option<AccessToken>,
}

impl AuthContext {
    pub fn new(config: SalesforceConfig, api_client: ApiClient) -> Self {
        Self {
            api_client,
            config,
            token: None,
        }
    }

    pub fn config(&self) -> &SalesforceConfig {
        &self.config
    }

    pub(crate) fn api_client(&self) -> &ApiClient {
        &self.api_client
    }

    /// Runs the OAuth password grant. When it fails and a session id is
    /// configured, that session is used instead.
    pub async fn authenticate(&mut self) -> Result<&AccessToken> {
        let token = match self.password_grant().await {
            Ok(token) => token,
            Err(err) => match self.configured_session() {
                Some(token) => {
                    warn!("password grant failed ({}), using configured session id", err);
                    token
                }
                None => return Err(err),
            },
        };
        info!("authenticated against {}", token.instance_url);
        Ok(self.token.insert(token))
    }

    /// Cached token, re-authenticating once it has expired.
    pub async fn token(&mut self) -> Result<&AccessToken> {
        let valid = self.token.as_ref().is_some_and(|token| !token.is_expired());
        if !valid {
            self.authenticate().await?;
        }
        self.token
            .as_ref()
            .ok_or_else(|| Error::precondition("no Salesforce access token"))
    }

    /// Drops the cached token so the next call authenticates again.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    async fn password_grant(&self) -> Result<AccessToken> {
        let password = format!(
            "{}{}",
            self.config.password,
            self.config.security_token.as_deref().unwrap_or_default()
        );
        let body = ReqBody::Form(vec![
            ReqParam::new("grant_type", "password"),
            ReqParam::new("client_id", &self.config.client_id),
            ReqParam::new("client_secret", &self.config.client_secret),
            ReqParam::new("username", &self.config.username),
            ReqParam::new("password", password),
        ]);
        let endpoint = Endpoint::new(
            HttpMethod::POST,
            format!("{}/services/oauth2/token", self.config.login_url),
        );
        let response = self
            .api_client
            .execute(HttpRequest::new(endpoint, body))
            .await?;
        let token: TokenResponse = serde_json::from_value(response.body)
            .map_err(|e| Error::invalid_response(format!("oauth2/token: {}", e)))?;
        Ok(AccessToken {
            access_token: token.access_token,
            instance_url: token.instance_url.trim_end_matches('/').to_string(),
            expires_at: SystemTime::now() + self.config.session_lifetime,
        })
    }

    fn configured_session(&self) -> Option<AccessToken> {
        let session_id = self.config.session_id.clone()?;
        let instance_url = self.config.instance_url.clone()?;
        Some(AccessToken {
            access_token: session_id,
            instance_url: instance_url.trim_end_matches('/').to_string(),
            expires_at: SystemTime::now() + self.config.session_lifetime,
        })
    }
}
