use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::TelemetrySink;
use crate::config::IotAgentConfig;
use crate::domain::{AerationBasin, GridSnapshot, PlantSnapshot, Pump};
use crate::error::DrError;

pub const GRID_DEVICE_ID: &str = "grid001";

/// Typed attribute value, serialized as `{"type": "Number", "value": 1.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// Device id on the IoT platform: `prefix` plus the last three characters
/// of the plant id, e.g. `basin002` becomes `aeration002`.
pub fn platform_device_id(prefix: &str, id: &str) -> String {
    let len = id.chars().count();
    let suffix: String = id.chars().skip(len.saturating_sub(3)).collect();
    format!("{prefix}{suffix}")
}

fn insert_number(map: &mut AttributeMap, name: &str, value: Option<f64>) {
    if let Some(v) = value {
        map.insert(name.to_string(), AttributeValue::Number(v));
    }
}

fn insert_text(map: &mut AttributeMap, name: &str, value: Option<String>) {
    if let Some(v) = value {
        map.insert(name.to_string(), AttributeValue::Text(v));
    }
}

fn pump_attributes(pump: &Pump) -> AttributeMap {
    let mut map = AttributeMap::new();
    insert_number(&mut map, "power", Some(pump.power_kw));
    insert_text(&mut map, "status", Some(pump.status.to_string()));
    insert_number(&mut map, "efficiency", Some(pump.efficiency));
    insert_number(&mut map, "optimized_power", pump.optimized_power_kw);
    insert_text(&mut map, "optimized_status", pump.optimized_status.map(|s| s.to_string()));
    insert_number(&mut map, "optimized_efficiency", pump.optimized_efficiency);
    map
}

fn basin_attributes(basin: &AerationBasin) -> AttributeMap {
    let mut map = AttributeMap::new();
    insert_number(&mut map, "power", Some(basin.power_kw));
    insert_number(&mut map, "dissolved_oxygen", Some(basin.dissolved_oxygen));
    insert_number(&mut map, "optimized_power", basin.optimized_power_kw);
    insert_number(
        &mut map,
        "optimized_dissolved_oxygen",
        basin.optimized_dissolved_oxygen,
    );
    map
}

fn grid_attributes(grid: &GridSnapshot) -> AttributeMap {
    let mut map = AttributeMap::new();
    insert_number(&mut map, "demand", Some(grid.demand_kw));
    insert_number(&mut map, "price", Some(grid.price_per_kwh));
    map
}

/// One `(device id, attributes)` entry per device plus one for the grid.
/// Optimized attributes are left out until they exist.
pub fn attribute_maps(snapshot: &PlantSnapshot) -> Vec<(String, AttributeMap)> {
    snapshot
        .pumps
        .iter()
        .map(|p| (platform_device_id("pump", &p.id), pump_attributes(p)))
        .chain(
            snapshot
                .aeration_basins
                .iter()
                .map(|b| (platform_device_id("aeration", &b.id), basin_attributes(b))),
        )
        .chain(std::iter::once((
            GRID_DEVICE_ID.to_string(),
            grid_attributes(&snapshot.grid),
        )))
        .collect()
}

/// Publishes device attributes to an IoT agent over its HTTP JSON transport.
#[derive(Clone)]
pub struct IotAgentPublisher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl IotAgentPublisher {
    pub fn new(cfg: &IotAgentConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("wastewater-dr-twin/0.1"),
        );
        headers.insert("fiware-service", HeaderValue::from_str(&cfg.fiware_service)?);
        headers.insert(
            "fiware-servicepath",
            HeaderValue::from_str(&cfg.fiware_servicepath)?,
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .default_headers(headers)
            .build()?;
        debug!(
            base_url = %cfg.base_url,
            service = %cfg.fiware_service,
            servicepath = %cfg.fiware_servicepath,
            "IoT agent publisher configured"
        );
        Ok(Self {
            client,
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/iot/json", self.base_url.trim_end_matches('/'))
    }

    pub async fn send_attributes(&self, device_id: &str, attributes: &AttributeMap) -> Result<(), DrError> {
        let resp = self
            .client
            .post(self.endpoint())
            .query(&[("k", self.api_key.as_str()), ("i", device_id)])
            .json(attributes)
            .send()
            .await
            .map_err(|e| DrError::sink(self.name(), e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DrError::sink(
                self.name(),
                format!("HTTP {status} for {device_id}: {body}"),
            ));
        }
        debug!(device_id, "attributes published");
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for IotAgentPublisher {
    fn name(&self) -> &str {
        "iot_agent"
    }

    async fn publish(&self, snapshot: &PlantSnapshot) -> Result<(), DrError> {
        let mut failed = 0;
        let mut first_error = None;
        let maps = attribute_maps(snapshot);
        let total = maps.len();

        for (device_id, attributes) in maps {
            if let Err(e) = self.send_attributes(&device_id, &attributes).await {
                warn!(sink = self.name(), %device_id, error = %e, "device publish failed");
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(DrError::sink(
                self.name(),
                format!("{failed} of {total} devices failed, first: {e}"),
            )),
            None => Ok(()),
        }
    }
}
