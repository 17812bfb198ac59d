//! End-to-end tests for `ApiClient` against a mock backend.
//!
//! The mock plays the role of the same-origin proxy mounted at `/api/proxy`.

use std::sync::Arc;
use std::time::Duration;

use portal_client::portal::{self, ProfileUpdate};
use portal_client::{ApiClient, ApiError, ClientConfig, NoSession, RetryConfig, StaticSession};
use portal_types::{ApiPath, HttpMethod, RequestDescriptor, SessionUser};
use pretty_assertions::assert_eq;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{any, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROXY: &str = "/api/proxy";

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
    }
}

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig::new(format!("{}{PROXY}", server.uri()))
        .unwrap()
        .with_retry(fast_retry())
}

fn anonymous_client(server: &MockServer) -> ApiClient {
    ApiClient::new(config_for(server), Arc::new(NoSession)).unwrap()
}

fn ada() -> SessionUser {
    SessionUser::new("Ada Lovelace", "ada@example.com").with_roles(["partner", "viewer"])
}

fn proxied(p: &str) -> String {
    format!("{PROXY}{p}")
}

fn get(p: &str) -> RequestDescriptor {
    RequestDescriptor::get(ApiPath::new(p).unwrap())
}

// ============================================================================
// Response decoding
// ============================================================================

#[tokio::test]
async fn json_success_is_returned_unchanged() {
    let server = MockServer::start().await;
    let payload = json!({ "items": [{ "id": "c1", "tags": ["a", "b"] }], "total": 1 });

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases")))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let value = anonymous_client(&server)
        .request(&get("/api/v1/cases"))
        .await
        .unwrap();
    assert_eq!(value, payload);
}

#[tokio::test]
async fn non_json_success_becomes_empty_object() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path(proxied("/api/v1/cases/c1")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string("deleted"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let value = anonymous_client(&server)
        .delete("/api/v1/cases/c1")
        .await
        .unwrap();
    assert_eq!(value, json!({}));
}

#[tokio::test]
async fn no_content_becomes_empty_object() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(proxied("/api/v1/cases/c1")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let value = anonymous_client(&server)
        .put("/api/v1/cases/c1", json!({ "status": "closed" }))
        .await
        .unwrap();
    assert_eq!(value, json!({}));
}

#[tokio::test]
async fn malformed_json_is_a_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases")))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{\"items\": [", "application/json"))
        .mount(&server)
        .await;

    let err = anonymous_client(&server)
        .request(&get("/api/v1/cases"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn post_sends_json_body() {
    let server = MockServer::start().await;
    let body = json!({ "title": "Invoice missing", "priority": 2 });

    Mock::given(method("POST"))
        .and(path(proxied("/api/v1/cases")))
        .and(header("content-type", "application/json"))
        .and(body_json(body.clone()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "c9" })))
        .expect(1)
        .mount(&server)
        .await;

    let value = anonymous_client(&server)
        .post("/api/v1/cases", body)
        .await
        .unwrap();
    assert_eq!(value, json!({ "id": "c9" }));
}

// ============================================================================
// Retry and classification
// ============================================================================

#[tokio::test]
async fn server_errors_are_retried_three_times_then_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases")))
        .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
        .expect(4) // Initial + 3 retries
        .mount(&server)
        .await;

    let err = anonymous_client(&server)
        .request(&get("/api/v1/cases"))
        .await
        .unwrap_err();

    match err {
        ApiError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "database down");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_server_error_recovers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases")))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let value = anonymous_client(&server)
        .request(&get("/api/v1/cases"))
        .await
        .unwrap();
    assert_eq!(value, json!([]));
}

#[tokio::test]
async fn service_unavailable_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases")))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&server)
        .await;

    let err = anonymous_client(&server)
        .request(&get("/api/v1/cases"))
        .await
        .unwrap_err();
    assert!(err.is_service_unavailable());
    assert!(!err.is_not_found());
    assert_eq!(err.body(), Some("maintenance"));
}

#[tokio::test]
async fn not_found_is_flagged() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases/missing")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = anonymous_client(&server)
        .request(&get("/api/v1/cases/missing"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_service_unavailable());
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(proxied("/api/v1/cases")))
        .respond_with(ResponseTemplate::new(422).set_body_string("title required"))
        .expect(1)
        .mount(&server)
        .await;

    let err = anonymous_client(&server)
        .post("/api/v1/cases", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(422));
    assert_eq!(err.body(), Some("title required"));
}

#[tokio::test]
async fn unauthorized_expires_session_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/users/me")))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(StaticSession::new(ada()));
    let client = ApiClient::new(config_for(&server), session.clone()).unwrap();

    let err = client.request(&get("/api/users/me")).await.unwrap_err();
    assert!(err.is_session_expired());
    assert!(session.is_expired());
}

#[tokio::test]
async fn retry_flag_off_sends_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases")))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = anonymous_client(&server)
        .request(&get("/api/v1/cases").without_retry())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn network_failure_surfaces_after_final_attempt() {
    let config = ClientConfig::new("http://127.0.0.1:1/api/proxy")
        .unwrap()
        .with_retry(fast_retry());
    let client = ApiClient::new(config, Arc::new(NoSession)).unwrap();

    let err = client.request(&get("/api/v1/cases")).await.unwrap_err();
    assert!(err.is_network_error());
    match err {
        ApiError::Network { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected Network, got {other:?}"),
    }
}

// ============================================================================
// Header injection
// ============================================================================

#[tokio::test]
async fn session_identity_headers_are_sent() {
    let server = MockServer::start().await;
    let expected_id = Uuid::new_v5(&Uuid::NAMESPACE_URL, b"ada@example.com").to_string();

    Mock::given(method("GET"))
        .and(path(proxied("/api/users/me")))
        .and(header("x-user-name", "Ada Lovelace"))
        .and(header("x-user-role", "partner"))
        .and(header("x-user-email", "ada@example.com"))
        .and(header("x-user-id", expected_id.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(config_for(&server), Arc::new(StaticSession::new(ada()))).unwrap();
    let value = client.request(&get("/api/users/me")).await.unwrap();
    assert_eq!(value, json!({ "ok": true }));
}

#[tokio::test]
async fn user_id_is_scoped_to_issuer() {
    let server = MockServer::start().await;
    let issuer = "https://id.example.com/realms/partners";
    let namespace = Uuid::new_v5(&Uuid::NAMESPACE_URL, issuer.as_bytes());
    let expected_id = Uuid::new_v5(&namespace, b"ada@example.com").to_string();

    Mock::given(method("GET"))
        .and(path(proxied("/api/users/me")))
        .and(header("x-user-id", expected_id.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server).with_keycloak_issuer(issuer);
    let client = ApiClient::new(config, Arc::new(StaticSession::new(ada()))).unwrap();
    client.request(&get("/api/users/me")).await.unwrap();
}

#[tokio::test]
async fn anonymous_requests_carry_only_trace_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    anonymous_client(&server)
        .request(&get("/api/v1/cases"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let headers = &requests[0].headers;
    assert!(headers.get("x-trace-id").is_some());
    assert!(headers.get("x-request-id").is_some());
    assert!(headers.get("x-user-name").is_none());
    assert!(headers.get("x-user-email").is_none());
    assert!(headers.get("x-user-id").is_none());
    assert!(headers.get("x-user-role").is_none());
}

#[tokio::test]
async fn trace_id_is_stable_across_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases")))
        .respond_with(ResponseTemplate::new(500))
        .expect(5) // 4 attempts + 1 unretried request
        .mount(&server)
        .await;

    let _ = anonymous_client(&server)
        .request(&get("/api/v1/cases"))
        .await;

    let requests = server.received_requests().await.unwrap();
    let trace_ids: Vec<_> = requests
        .iter()
        .map(|r| r.headers.get("x-trace-id").unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(trace_ids.len(), 4);
    assert!(trace_ids.iter().all(|id| *id == trace_ids[0]));

    // Separate logical requests get separate trace ids.
    let _ = anonymous_client(&server)
        .request(&get("/api/v1/cases").without_retry())
        .await;
    let requests = server.received_requests().await.unwrap();
    let last = requests.last().unwrap().headers.get("x-trace-id").unwrap();
    assert_ne!(last.to_str().unwrap(), trace_ids[0]);
}

// ============================================================================
// GUID resolution
// ============================================================================

#[tokio::test]
async fn non_guid_identifier_is_rewritten_via_lookup() {
    let server = MockServer::start().await;
    let guid = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(proxied("/api/users/lookup/jdoe")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": guid.to_string() })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(proxied(&format!("/api/users/{guid}/profile"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": guid.to_string() })))
        .expect(1)
        .mount(&server)
        .await;

    let template = ApiPath::new("/api/users/{id}/profile").unwrap();
    let value = anonymous_client(&server)
        .request_for_user(&template, "jdoe", HttpMethod::Get, None)
        .await
        .unwrap();
    assert_eq!(value, json!({ "id": guid.to_string() }));
}

#[tokio::test]
async fn guid_identifier_skips_lookup() {
    let server = MockServer::start().await;
    let guid = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(proxied(&format!("/api/users/lookup/{guid}"))))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let resolved = anonymous_client(&server)
        .resolve_guid(&guid.to_string())
        .await
        .unwrap();
    assert_eq!(resolved, guid);
}

#[tokio::test]
async fn lookup_without_guid_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/users/lookup/jdoe")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "username": "jdoe" })))
        .expect(1)
        .mount(&server)
        .await;

    let err = anonymous_client(&server)
        .resolve_guid("jdoe")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::GuidLookup { .. }));
}

#[tokio::test]
async fn unknown_identifier_propagates_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/users/lookup/ghost")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = anonymous_client(&server)
        .resolve_guid("ghost")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn custom_lookup_path_is_used() {
    let server = MockServer::start().await;
    let guid = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(proxied("/api/v2/directory/jdoe")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "guid": guid.to_string() })))
        .expect(1)
        .mount(&server)
        .await;

    let config =
        config_for(&server).with_guid_lookup_path(ApiPath::new("/api/v2/directory/").unwrap());
    let client = ApiClient::new(config, Arc::new(NoSession)).unwrap();
    assert_eq!(client.resolve_guid("jdoe").await.unwrap(), guid);
}

#[tokio::test]
async fn dot_identifiers_never_reach_the_backend() {
    let server = MockServer::start().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let client = anonymous_client(&server);
    for identifier in ["..", ".", " .. "] {
        let err = client.resolve_guid(identifier).await.unwrap_err();
        assert!(
            matches!(err, ApiError::InvalidPath(_)),
            "{identifier:?}: {err:?}"
        );
    }

    let err = portal::list_messages(&client, "..").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidPath(_)));

    let err = client.get("/api/v1/cases/../messages").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidPath(_)));
}

#[tokio::test]
async fn template_without_placeholder_is_rejected() {
    let server = MockServer::start().await;
    let template = ApiPath::new("/api/users/profile").unwrap();

    let err = anonymous_client(&server)
        .request_for_user(&template, "jdoe", HttpMethod::Get, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::GuidLookup { .. }));
}

// ============================================================================
// Portal endpoints
// ============================================================================

#[tokio::test]
async fn profile_round_trip() {
    let server = MockServer::start().await;
    let guid = Uuid::new_v4();
    let profile_path = proxied(&format!("/api/users/{guid}/profile"));

    Mock::given(method("GET"))
        .and(path(profile_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": guid.to_string(),
            "firstName": "Ada",
            "lastName": "Lovelace"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(profile_path.as_str()))
        .and(body_json(json!({ "jobTitle": "Analyst" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": guid.to_string(),
            "firstName": "Ada",
            "jobTitle": "Analyst"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = anonymous_client(&server);
    let profile = portal::get_profile(&client, &guid.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.last_name.as_deref(), Some("Lovelace"));

    let update = ProfileUpdate {
        job_title: Some("Analyst".to_string()),
        ..ProfileUpdate::default()
    };
    let updated = portal::update_profile(&client, &guid.to_string(), &update)
        .await
        .unwrap();
    assert_eq!(updated.job_title.as_deref(), Some("Analyst"));
}

#[tokio::test]
async fn missing_profile_degrades_to_none() {
    let server = MockServer::start().await;
    let guid = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(proxied(&format!("/api/users/{guid}/profile"))))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let profile = portal::get_profile(&anonymous_client(&server), &guid.to_string())
        .await
        .unwrap();
    assert_eq!(profile, None);
}

#[tokio::test]
async fn cases_degrade_to_empty_when_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases")))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let cases = portal::list_cases(&anonymous_client(&server)).await.unwrap();
    assert!(cases.is_empty());
}

#[tokio::test]
async fn cases_no_content_is_an_empty_list() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let cases = portal::list_cases(&anonymous_client(&server)).await.unwrap();
    assert!(cases.is_empty());
}

#[tokio::test]
async fn messages_non_json_success_is_an_empty_list() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases/c1/messages")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string("no messages"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let messages = portal::list_messages(&anonymous_client(&server), "c1")
        .await
        .unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn cases_propagate_session_expiry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases")))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = portal::list_cases(&anonymous_client(&server))
        .await
        .unwrap_err();
    assert!(err.is_session_expired());
}

#[tokio::test]
async fn messages_accept_wrapped_list() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(proxied("/api/v1/cases/c1/messages")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": "m1", "author": "support", "body": "Hello" },
                { "id": "m2", "body": "Thanks" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let messages = portal::list_messages(&anonymous_client(&server), "c1")
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].author.as_deref(), Some("support"));
    assert_eq!(messages[1].body, "Thanks");
}
