// ABOUTME: HTTP-level tests for the packager client against a mock server
// ABOUTME: Covers request routing, status decoding and remote error mapping

use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vrooli_deployment::packager::{DesktopGenerateRequest, InstallerRequest};
use vrooli_deployment::{wait_for_build, BuildStatusSource, DeploymentError, Packager, PackagerClient};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_generate_desktop_posts_manifest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/desktop/generate"))
        .and(body_partial_json(json!({"manifest_path": "/out/s/bundle.json"})))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "build_id": "wrap-9",
            "status": "building"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = PackagerClient::new(&format!("{}/", server.uri())).unwrap();
    let status = client
        .generate_desktop(&DesktopGenerateRequest {
            manifest_path: "/out/s/bundle.json".into(),
            platforms: vec!["linux".into()],
            output_path: "/out/s/desktop".into(),
        })
        .await
        .unwrap();

    assert_eq!(status.build_id, "wrap-9");
    assert_eq!(status.status, "building");
}

#[tokio::test]
async fn test_remote_error_carries_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/desktop/installers"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "disk full"})))
        .mount(&server)
        .await;

    let client = PackagerClient::new(&server.uri()).unwrap();
    let err = client
        .build_installers(&InstallerRequest {
            build_id: "wrap-9".into(),
            platforms: vec![],
        })
        .await
        .unwrap_err();

    match err {
        DeploymentError::Remote {
            status, message, ..
        } => {
            assert_eq!(status, 500);
            assert_eq!(message, "disk full");
        }
        other => panic!("expected Remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_wait_for_build_survives_transient_status_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/desktop/status/b-1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/desktop/status/b-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "build_id": "b-1",
            "status": "ready",
            "output_path": "/out/desktop",
            "platform_results": {"linux": {"status": "success", "binary_path": "/out/bin/app"}},
            "artifacts": {"linux": "/out/app.AppImage"}
        })))
        .mount(&server)
        .await;

    let client = PackagerClient::new(&server.uri()).unwrap();
    assert!(client.get_build_status("b-1").await.is_err());

    let status = wait_for_build(&client, "b-1", Duration::from_millis(10), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status.output_path.as_deref(), Some("/out/desktop"));
    assert_eq!(status.binaries()["linux"], "/out/bin/app");
}

#[tokio::test]
async fn test_wait_for_build_reports_remote_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/desktop/status/b-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "build_id": "b-2",
            "status": "failed",
            "error": "notarization rejected"
        })))
        .mount(&server)
        .await;

    let client = PackagerClient::new(&server.uri()).unwrap();
    let err = wait_for_build(&client, "b-2", Duration::from_millis(10), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("notarization rejected"));
}

#[test]
fn test_empty_base_url_is_rejected() {
    assert!(matches!(
        PackagerClient::new("  "),
        Err(DeploymentError::Configuration(_))
    ));
}
