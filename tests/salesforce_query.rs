use std::time::Duration;

use serde_json::json;
use sfrail::config::SalesforceConfig;
use sfrail::http::ApiClient;
use sfrail::query::Query;
use sfrail::salesforce::{AuthContext, QueryExecutor};
use sfrail::Error;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(mock_server: &MockServer) -> SalesforceConfig {
    SalesforceConfig {
        login_url: mock_server.uri(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        username: "qa@example.com.uat".to_string(),
        password: "hunter2".to_string(),
        security_token: Some("TOKEN".to_string()),
        api_version: "60.0".to_string(),
        session_id: None,
        instance_url: None,
        session_lifetime: Duration::from_secs(3600),
    }
}

async fn mount_token(mock_server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("password=hunter2TOKEN"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "00Dxx!session",
            "instance_url": mock_server.uri(),
            "token_type": "Bearer",
            "issued_at": "1700000000000"
        })))
        .expect(expected_calls)
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_token_is_cached() {
    let mock_server = MockServer::start().await;
    mount_token(&mock_server, 1).await;

    let mut auth = AuthContext::new(config(&mock_server), ApiClient::new());
    let first = auth.token().await.unwrap().clone();
    let second = auth.token().await.unwrap().clone();

    assert_eq!(first.access_token, "00Dxx!session");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_falls_back_to_configured_session() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "authentication failure"
        })))
        .mount(&mock_server)
        .await;

    let mut config = config(&mock_server);
    config.session_id = Some("00Dxx!fallback".to_string());
    config.instance_url = Some("https://acme.my.salesforce.com/".to_string());
    let mut auth = AuthContext::new(config, ApiClient::new());
    let token = auth.authenticate().await.unwrap();

    assert_eq!(token.access_token, "00Dxx!fallback");
    assert_eq!(token.instance_url, "https://acme.my.salesforce.com");
}

#[tokio::test]
async fn test_grant_failure_without_session_is_returned() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&mock_server)
        .await;

    let mut auth = AuthContext::new(config(&mock_server), ApiClient::new());
    let result = auth.authenticate().await;

    assert!(matches!(result, Err(Error::Backend { status: 400, .. })));
}

#[tokio::test]
async fn test_query_follows_next_records_url() {
    let mock_server = MockServer::start().await;
    mount_token(&mock_server, 1).await;
    Mock::given(method("GET"))
        .and(path("/services/data/v60.0/query"))
        .and(query_param("q", "SELECT Id, Name FROM Account WHERE Industry = 'Banking' LIMIT 3"))
        .and(header("authorization", "Bearer 00Dxx!session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 3,
            "done": false,
            "nextRecordsUrl": "/services/data/v60.0/query/01gxx-2000",
            "records": [{"Id": "001A"}, {"Id": "001B"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/data/v60.0/query/01gxx-2000"))
        .and(header("authorization", "Bearer 00Dxx!session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 3,
            "done": true,
            "records": [{"Id": "001C"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut executor = QueryExecutor::new(AuthContext::new(config(&mock_server), ApiClient::new()));
    let query = Query::new()
        .select(["Id", "Name"])
        .from("Account")
        .where_("Industry = 'Banking'")
        .limit(3);
    let rows = executor.execute(&query).await.unwrap();

    let ids: Vec<&str> = rows.iter().map(|row| row["Id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["001A", "001B", "001C"]);
}

#[tokio::test]
async fn test_unbuildable_query_sends_nothing() {
    let mock_server = MockServer::start().await;
    let mut executor = QueryExecutor::new(AuthContext::new(config(&mock_server), ApiClient::new()));

    let result = executor.execute(&Query::new().select(["Id"])).await;

    assert!(matches!(result, Err(Error::Configuration { .. })));
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_session_is_dropped() {
    let mock_server = MockServer::start().await;
    mount_token(&mock_server, 2).await;
    Mock::given(method("GET"))
        .and(path("/services/data/v60.0/query"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!([
            {"message": "Session expired or invalid", "errorCode": "INVALID_SESSION_ID"}
        ])))
        .expect(2)
        .mount(&mock_server)
        .await;

    let mut executor = QueryExecutor::new(AuthContext::new(config(&mock_server), ApiClient::new()));
    let first = executor.query("SELECT Id FROM User").await;
    let second = executor.query("SELECT Id FROM User").await;

    assert_eq!(first.unwrap_err().status_code(), Some(401));
    assert_eq!(second.unwrap_err().status_code(), Some(401));
}

#[tokio::test]
async fn test_expired_token_authenticates_again() {
    let mock_server = MockServer::start().await;
    mount_token(&mock_server, 2).await;

    let mut config = config(&mock_server);
    config.session_lifetime = Duration::ZERO;
    let mut auth = AuthContext::new(config, ApiClient::new());
    let first = auth.token().await.unwrap().clone();
    assert!(first.is_expired());
    let second = auth.token().await.unwrap().clone();

    assert_eq!(second.access_token, "00Dxx!session");
    assert!(second.expires_at >= first.expires_at);
}
