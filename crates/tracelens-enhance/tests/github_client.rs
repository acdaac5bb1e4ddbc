//! Integration tests for the GitHub client.
//!
//! All tests use wiremock to mock the GitHub API - no real API calls are made.

mod common;

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracelens_enhance::catalog::{IntegrationKind, MemoryCatalog, ProjectId, Workspace, WorkspaceId};
use tracelens_enhance::config::{EnhanceConfig, GitHubConfig};
use tracelens_enhance::error::HostError;
use tracelens_enhance::host::{GitHubClient, GitHubClientFactory, SourceHost};
use tracelens_enhance::{EnhancementOutcome, Enhancer, FrameOutcome};
use tracelens_state::MemoryKv;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{default_service, encode, json_trace, request, source, PROJECT, WORKSPACE};

const TOKEN: &str = "ghp_test_token";

fn mock_config(server_url: &str) -> GitHubConfig {
    GitHubConfig {
        api_url: server_url.to_string(),
        ..GitHubConfig::default()
    }
}

fn client(server: &MockServer) -> GitHubClient {
    GitHubClient::new(
        &mock_config(&server.uri()),
        SecretString::from(TOKEN.to_string()),
    )
    .unwrap()
}

#[tokio::test]
async fn file_content_sends_auth_and_revision() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/contents/src/app/main.go"))
        .and(query_param("ref", "a1b2c3d4e5"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .and(header("accept", "application/vnd.github+json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining", "4999")
                .insert_header("x-ratelimit-reset", "1700000000")
                .set_body_json(json!({
                    "type": "file",
                    "encoding": "base64",
                    "content": "aGVsbG8K\n",
                    "sha": "3b18e512dba79e4c8300dd08aeb37f8e728b8dad"
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let file = client(&server)
        .file_content("acme/api", "src/app/main.go", "a1b2c3d4e5")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(file.content, "aGVsbG8K\n");
    assert_eq!(
        file.sha.as_deref(),
        Some("3b18e512dba79e4c8300dd08aeb37f8e728b8dad")
    );
    assert_eq!(file.rate.remaining, Some(4999));
    assert_eq!(file.rate.reset_at.unwrap().timestamp(), 1_700_000_000);
}

#[tokio::test]
async fn leading_slash_in_path_is_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/contents/src/main.rs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": "",
            "sha": "abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let file = client(&server)
        .file_content("acme/api", "/src/main.rs", "main")
        .await
        .unwrap()
        .unwrap();

    assert!(file.needs_blob_fetch());
}

#[tokio::test]
async fn directory_listing_is_not_a_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/contents/src"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"type": "file", "name": "main.rs", "sha": "abc"}
        ])))
        .mount(&server)
        .await;

    let file = client(&server)
        .file_content("acme/api", "src", "main")
        .await
        .unwrap();

    assert!(file.is_none());
}

#[tokio::test]
async fn error_status_carries_message_and_quota() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/contents/src/main.rs"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .set_body_json(json!({
                    "message": "API rate limit exceeded for installation ID 1.",
                    "documentation_url": "https://docs.github.com/rest"
                })),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .file_content("acme/api", "src/main.rs", "main")
        .await
        .unwrap_err();

    let HostError::Status {
        status,
        ref message,
        rate,
        ..
    } = err
    else {
        panic!("expected status error");
    };
    assert_eq!(status, 403);
    assert!(message.starts_with("API rate limit exceeded"));
    assert!(rate.is_exhausted());
    assert!(err.rate().is_some());
}

#[tokio::test]
async fn not_found_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;

    let err = client(&server)
        .file_content("acme/api", "missing.rs", "main")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HostError::Status { status: 404, ref message, .. } if message == "Not Found"
    ));
}

#[tokio::test]
async fn blob_is_fetched_by_sha() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/git/blobs/b10b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "b10b",
            "size": 3,
            "encoding": "base64",
            "content": "Ymln"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let blob = client(&server).blob("acme/api", "b10b").await.unwrap();
    assert_eq!(blob.content, "Ymln");
}

#[tokio::test]
async fn latest_commit_reads_first_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/commits"))
        .and(query_param("per_page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", "1700000000")
                .set_body_json(json!([
                    {"sha": "0123456789abcdef0123456789abcdef01234567"}
                ])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let commit = client(&server).latest_commit("acme/api").await.unwrap();
    assert_eq!(commit.sha, "0123456789abcdef0123456789abcdef01234567");
    assert!(commit.rate.is_exhausted());
    assert_eq!(commit.rate.reset_at.unwrap().timestamp(), 1_700_000_000);
}

#[tokio::test]
async fn empty_repository_has_no_commits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/empty/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = client(&server).latest_commit("acme/empty").await.unwrap_err();
    assert!(matches!(err, HostError::NoCommits(repo) if repo == "acme/empty"));
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/git/blobs/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client(&server).blob("acme/api", "abc").await.unwrap_err();
    assert!(matches!(err, HostError::Decode { .. }));
}

#[tokio::test]
async fn enhancer_over_github_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"sha": "feedfacefeedfacefeedfacefeedfacefeedface"}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/contents/src/app/main.go"))
        .and(query_param("ref", "feedfacefeedfacefeedfacefeedfacefeedface"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": encode(&source(20)),
            "sha": "abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = MemoryCatalog::new();
    catalog.insert_service(default_service()).await;
    catalog
        .insert_workspace(
            ProjectId(PROJECT),
            Workspace {
                id: WorkspaceId(WORKSPACE),
            },
        )
        .await;
    catalog
        .insert_token(WorkspaceId(WORKSPACE), IntegrationKind::GitHub, TOKEN)
        .await;

    let enhancer = Enhancer::new(
        &EnhanceConfig::default(),
        Arc::new(MemoryKv::new()),
        Arc::new(catalog),
        Arc::new(GitHubClientFactory::new(mock_config(&server.uri()))),
    );

    let raw = json_trace(&[("/build/app/main.go", 7), ("/build/app/main.go", 8)]);
    let outcome = enhancer
        .enhance(&request(raw, "main"), &CancellationToken::new())
        .await
        .unwrap();

    let EnhancementOutcome::Enhanced(trace) = outcome else {
        panic!("expected enhancement");
    };
    assert_eq!(
        trace.outcomes,
        vec![FrameOutcome::Enhanced, FrameOutcome::Enhanced]
    );
    assert_eq!(trace.frames[0].line_content.as_deref(), Some("line 7"));
    assert_eq!(trace.frames[1].line_content.as_deref(), Some("line 8"));
}
