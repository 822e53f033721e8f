//! Publishing targets for per-tick plant state.
//!
//! Every sink receives the same snapshot for a tick. Failures are reported
//! as [`DrError::SinkUnavailable`] and never stop the control loop.

pub mod dashboard;
pub mod history;
pub mod iot_agent;

use async_trait::async_trait;

use crate::domain::PlantSnapshot;
use crate::error::DrError;

pub use dashboard::{DashboardClient, DashboardPayload};
pub use history::{HistoryRecord, HistorySink, HistoryStore};
pub use iot_agent::{attribute_maps, AttributeMap, AttributeValue, IotAgentPublisher};

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, snapshot: &PlantSnapshot) -> Result<(), DrError>;

    /// Releases held connections. Called once when the loop exits.
    async fn disconnect(&self) -> Result<(), DrError> {
        Ok(())
    }
}
