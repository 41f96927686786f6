use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::housekeeping::RunReport;

/// Payload for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Payload for `GET /status`. `last_run` stays absent until the first
/// housekeeping run completes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub sources_total: usize,
    pub sources_enabled: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RunReport>,
}
