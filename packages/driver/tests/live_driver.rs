// ABOUTME: Smoke tests against a real browser driver started by the lifecycle harness
// ABOUTME: Skipped unless VROOLI_LIFECYCLE_MANAGED is present in the environment

use vrooli_config::Settings;
use vrooli_driver::{CreateSessionRequest, DriverClient};

fn live_settings() -> Option<Settings> {
    let settings = Settings::from_env().expect("settings");
    if settings.lifecycle_managed {
        Some(settings)
    } else {
        eprintln!("skipping: VROOLI_LIFECYCLE_MANAGED is not set");
        None
    }
}

#[tokio::test]
async fn test_live_session_round_trip() {
    let Some(settings) = live_settings() else {
        return;
    };
    let client = DriverClient::new(&settings.driver_url).expect("client");

    let health = client.health().await.expect("driver health");
    assert!(!health.status.is_empty());

    let session_id = client
        .create_session(&CreateSessionRequest::new("live-exec", "live-workflow"))
        .await
        .expect("create session");
    client.reset_session(&session_id).await.expect("reset");
    client.close_session(&session_id).await.expect("close");
}
