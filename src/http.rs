use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReqParam {
    pub key: String,
    pub value: String,
}

impl ReqParam {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        ReqParam {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single file sent as `multipart/form-data`.
#[derive(Debug)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub enum ReqBody {
    Empty,
    Json(Value),
    Form(Vec<ReqParam>),
    File(FilePart),
}

impl ReqBody {
    pub fn empty() -> Self {
        ReqBody::Empty
    }

    pub fn json(value: Value) -> Self {
        ReqBody::Json(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    POST,
    GET,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::POST => write!(f, "POST"),
            HttpMethod::GET => write!(f, "GET"),
        }
    }
}

#[derive(Debug)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub url: String,
    pub query_params: Vec<ReqParam>,
    pub headers: Vec<ReqParam>,
}

impl Endpoint {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Endpoint {
        Endpoint {
            method,
            url: url.into(),
            query_params: vec![],
            headers: vec![],
        }
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push(ReqParam::new(key, value));
        self
    }

    pub fn with_header(mut self, header: ReqParam) -> Self {
        self.headers.push(header);
        self
    }

    /// Query params are appended url-encoded after whatever query the base url already carries.
    pub fn to_url(&self) -> Result<Url, HttpError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| HttpError::InvalidRequest(format!("invalid url {}: {}", self.url, e)))?;
        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for param in &self.query_params {
                pairs.append_pair(&param.key, &param.value);
            }
        }
        Ok(url)
    }
}

#[derive(Debug)]
pub struct HttpRequest {
    pub endpoint: Endpoint,
    pub req_body: ReqBody,
}

impl HttpRequest {
    pub fn new(endpoint: Endpoint, req_body: ReqBody) -> HttpRequest {
        HttpRequest { endpoint, req_body }
    }
}

#[derive(Debug)]
pub struct HttpResult {
    pub body: Value,
    pub status_code: u16,
}

impl HttpResult {
    pub fn new(body: Value, status_code: u16) -> Self {
        Self { body, status_code }
    }
}

#[derive(Clone, Debug)]
pub enum HttpError {
    Status(u16, StatusError),
    Io(String),
    Decode(String),
    InvalidRequest(String),
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum StatusError {
    ClientError(String),
    ServerError(String),
}

#[derive(Clone, Default)]
pub struct ApiClient {
    client: Client,
}

impl ApiClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResult, HttpError> {
        let req = self.build_reqwest(request)?;
        match req.send().await {
            Ok(response) => {
                let status_code = response.status();
                debug!("http request executed, status_code: {}", status_code);
                let text = response
                    .text()
                    .await
                    .map_err(|e| HttpError::Io(e.to_string()))?;
                if status_code.is_success() {
                    let body = if text.trim().is_empty() {
                        Value::Null
                    } else {
                        serde_json::from_str(&text)
                            .map_err(|e| HttpError::Decode(format!("{}: {}", e, text)))?
                    };
                    Ok(HttpResult::new(body, status_code.as_u16()))
                } else if status_code.is_client_error() {
                    info!("http request failed: {}", text);
                    Err(HttpError::Status(
                        status_code.as_u16(),
                        StatusError::ClientError(text),
                    ))
                } else {
                    info!("http request failed: {}", text);
                    Err(HttpError::Status(
                        status_code.as_u16(),
                        StatusError::ServerError(text),
                    ))
                }
            }
            Err(error) => {
                info!("http request failed: {}", error);
                Err(HttpError::Io(error.to_string()))
            }
        }
    }

    fn build_reqwest(&self, request: HttpRequest) -> Result<RequestBuilder, HttpError> {
        let endpoint = request.endpoint;
        let url = endpoint.to_url()?;
        debug!("{} {}", endpoint.method, url);
        let library_method = match endpoint.method {
            HttpMethod::POST => Method::POST,
            HttpMethod::GET => Method::GET,
        };

        let mut headers = HeaderMap::new();
        for header in &endpoint.headers {
            let name = HeaderName::from_bytes(header.key.as_bytes())
                .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
            let value = HeaderValue::from_str(&header.value)
                .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
            headers.insert(name, value);
        }

        let req = self.client.request(library_method, url).headers(headers);
        let req = match request.req_body {
            ReqBody::Empty => req,
            ReqBody::Json(body) => req.json(&body),
            ReqBody::Form(params) => {
                let pairs: Vec<(String, String)> =
                    params.into_iter().map(|p| (p.key, p.value)).collect();
                req.form(&pairs)
            }
            ReqBody::File(file) => {
                debug!("multipart file: {} ({} bytes)", file.file_name, file.bytes.len());
                let part = Part::bytes(file.bytes).file_name(file.file_name);
                req.multipart(Form::new().part(file.field, part))
            }
        };
        Ok(req)
    }
}

/// `Authorization: Basic base64(username:secret)`.
pub fn basic_auth_header(username: &str, secret: &str) -> ReqParam {
    let encoded = STANDARD.encode(format!("{}:{}", username, secret));
    ReqParam::new("Authorization", format!("Basic {}", encoded))
}

pub fn bearer_auth_header(token: &str) -> ReqParam {
    ReqParam::new("Authorization", format!("Bearer {}", token))
}
