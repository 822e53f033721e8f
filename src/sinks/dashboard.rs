use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::TelemetrySink;
use crate::config::DashboardConfig;
use crate::domain::{AerationBasin, GridSnapshot, PlantSnapshot, Pump};
use crate::error::DrError;

/// Document accepted by the dashboard: raw and optimized fields per device,
/// optimized ones `null` until the first optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardPayload {
    /// ISO-8601; receivers stamp the document themselves when it is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub pumps: Vec<Pump>,
    pub aeration_basins: Vec<AerationBasin>,
    pub grid: GridSnapshot,
}

impl From<&PlantSnapshot> for DashboardPayload {
    fn from(snapshot: &PlantSnapshot) -> Self {
        Self {
            timestamp: Some(snapshot.timestamp),
            pumps: snapshot.pumps.clone(),
            aeration_basins: snapshot.aeration_basins.clone(),
            grid: snapshot.grid,
        }
    }
}

#[derive(Clone)]
pub struct DashboardClient {
    client: reqwest::Client,
    url: String,
}

impl DashboardClient {
    pub fn new(cfg: &DashboardConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("wastewater-dr-twin/0.1"),
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            url: cfg.url.clone(),
        })
    }
}

#[async_trait]
impl TelemetrySink for DashboardClient {
    fn name(&self) -> &str {
        "dashboard"
    }

    async fn publish(&self, snapshot: &PlantSnapshot) -> Result<(), DrError> {
        let payload = DashboardPayload::from(snapshot);
        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DrError::sink(self.name(), e))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(DrError::sink(self.name(), format!("HTTP {status}: {body}")));
        }
        debug!(sink = self.name(), response = %body, "dashboard updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PumpStatus;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn snapshot() -> PlantSnapshot {
        PlantSnapshot {
            timestamp: "2024-09-26T10:00:00Z".parse().unwrap(),
            pumps: vec![Pump::new("pump001", 100.0, 0.8, PumpStatus::Running)],
            aeration_basins: vec![AerationBasin::new("basin001", 200.0, 2.0)],
            grid: GridSnapshot::new(5000.0, 0.1),
        }
    }

    fn config(url: String) -> DashboardConfig {
        DashboardConfig {
            enabled: true,
            url,
            timeout_seconds: 2,
        }
    }

    #[test]
    fn test_payload_shape() {
        let json = serde_json::to_value(DashboardPayload::from(&snapshot())).unwrap();
        assert_eq!(json["timestamp"], "2024-09-26T10:00:00Z");
        assert_eq!(json["pumps"][0]["id"], "pump001");
        assert!(json["pumps"][0]["optimized_power"].is_null());
        assert_eq!(json["aeration_basins"][0]["dissolved_oxygen"], 2.0);
        assert!(json["aeration_basins"][0]["optimized_dissolved_oxygen"].is_null());
        assert_eq!(json["grid"]["demand"], 5000.0);
    }

    #[test]
    fn test_payload_without_timestamp_parses() {
        let payload: DashboardPayload = serde_json::from_value(serde_json::json!({
            "pumps": [],
            "aeration_basins": [],
            "grid": { "demand": 1.0, "price": 0.1 }
        }))
        .unwrap();
        assert!(payload.timestamp.is_none());
    }

    #[tokio::test]
    async fn test_publish_posts_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/update_data"))
            .and(body_partial_json(serde_json::json!({ "grid": { "demand": 5000.0 } })))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = DashboardClient::new(&config(format!("{}/update_data", server.uri()))).unwrap();
        client.publish(&snapshot()).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = DashboardClient::new(&config(format!("{}/update_data", server.uri()))).unwrap();
        let err = client.publish(&snapshot()).await.unwrap_err();
        assert!(matches!(err, DrError::SinkUnavailable { .. }));
        assert!(err.to_string().contains("boom"));
    }
}
