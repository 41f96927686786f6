mod common;

use chrono::Utc;
use uuid::Uuid;

use crl_housekeeper::housekeeping::scheduler::report_slot;
use crl_housekeeper::housekeeping::{HealthState, HealthStatus, RunReport, RunSummary};
use crl_housekeeper::server::AppState;

use common::spawn_status_server;

#[tokio::test]
async fn health_answers_with_the_service_identity() {
    let base = spawn_status_server(AppState {
        sources_total: 0,
        sources_enabled: 0,
        last_run: report_slot(),
    })
    .await;

    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "crl-housekeeper");
    assert!(body["version"].as_str().is_some_and(|v| !v.is_empty()));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn status_reflects_the_registry_and_the_latest_run() {
    let slot = report_slot();
    let base = spawn_status_server(AppState {
        sources_total: 3,
        sources_enabled: 2,
        last_run: slot.clone(),
    })
    .await;

    let before: serde_json::Value = reqwest::get(format!("{base}/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(before["sources_total"], 3);
    assert_eq!(before["sources_enabled"], 2);
    assert!(before.get("last_run").is_none());

    let run_id = Uuid::new_v4();
    let mut summary = RunSummary::new(run_id, Utc::now(), 3, 2);
    summary.fetched = 2;
    summary.healthy = 2;
    *slot.write().await = Some(RunReport {
        summary,
        statuses: vec![HealthStatus {
            name: "corporate-ca".to_string(),
            status: HealthState::Healthy,
            age_hours: Some(0.2),
        }],
    });

    let after: serde_json::Value = reqwest::get(format!("{base}/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let last_run = &after["last_run"];
    assert_eq!(last_run["summary"]["run_id"], run_id.to_string());
    assert_eq!(last_run["summary"]["fetched"], 2);
    assert_eq!(last_run["statuses"][0]["name"], "corporate-ca");
    assert_eq!(last_run["statuses"][0]["status"], "healthy");
}
