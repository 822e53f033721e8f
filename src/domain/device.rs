use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Operating status reported for pumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PumpStatus {
    Running,
    Idle,
}

impl PumpStatus {
    /// `running` when the pump draws any power, otherwise `idle`.
    pub fn from_power(power_kw: f64) -> Self {
        if power_kw > 0.0 {
            PumpStatus::Running
        } else {
            PumpStatus::Idle
        }
    }
}

/// Kind of controllable load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum DeviceKind {
    #[strum(serialize = "Pump")]
    Pump,
    #[strum(serialize = "Aeration Basin")]
    AerationBasin,
}

impl DeviceKind {
    /// Name of the kind-specific dependent attribute.
    pub fn dependent_attribute_name(&self) -> &'static str {
        match self {
            DeviceKind::Pump => "efficiency",
            DeviceKind::AerationBasin => "dissolved_oxygen",
        }
    }
}

/// Kind-agnostic view of a device as the optimizer sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub kind: DeviceKind,
    pub id: String,
    /// Current electrical draw in kW.
    pub power_kw: f64,
    /// Efficiency for pumps, dissolved oxygen (mg/L) for basins.
    pub dependent_attribute: f64,
}

/// New operating point decided for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSetpoint {
    pub kind: DeviceKind,
    pub id: String,
    pub power_kw: f64,
    pub dependent_attribute: f64,
    /// Only set for pumps.
    pub status: Option<PumpStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pump {
    pub id: String,
    #[serde(rename = "power")]
    pub power_kw: f64,
    pub efficiency: f64,
    pub status: PumpStatus,
    #[serde(rename = "optimized_power")]
    pub optimized_power_kw: Option<f64>,
    pub optimized_efficiency: Option<f64>,
    pub optimized_status: Option<PumpStatus>,
}

impl Pump {
    pub fn new(id: impl Into<String>, power_kw: f64, efficiency: f64, status: PumpStatus) -> Self {
        Self {
            id: id.into(),
            power_kw,
            efficiency,
            status,
            optimized_power_kw: None,
            optimized_efficiency: None,
            optimized_status: None,
        }
    }

    pub fn state(&self) -> DeviceState {
        DeviceState {
            kind: DeviceKind::Pump,
            id: self.id.clone(),
            power_kw: self.power_kw,
            dependent_attribute: self.efficiency,
        }
    }

    /// Writes the optimized fields; raw readings are left untouched.
    pub fn apply(&mut self, setpoint: &DeviceSetpoint) {
        self.optimized_power_kw = Some(setpoint.power_kw);
        self.optimized_efficiency = Some(setpoint.dependent_attribute);
        self.optimized_status = Some(
            setpoint
                .status
                .unwrap_or_else(|| PumpStatus::from_power(setpoint.power_kw)),
        );
    }

    pub fn is_optimized(&self) -> bool {
        self.optimized_power_kw.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AerationBasin {
    pub id: String,
    #[serde(rename = "power")]
    pub power_kw: f64,
    /// Dissolved oxygen in mg/L.
    pub dissolved_oxygen: f64,
    #[serde(rename = "optimized_power")]
    pub optimized_power_kw: Option<f64>,
    pub optimized_dissolved_oxygen: Option<f64>,
}

impl AerationBasin {
    pub fn new(id: impl Into<String>, power_kw: f64, dissolved_oxygen: f64) -> Self {
        Self {
            id: id.into(),
            power_kw,
            dissolved_oxygen,
            optimized_power_kw: None,
            optimized_dissolved_oxygen: None,
        }
    }

    pub fn state(&self) -> DeviceState {
        DeviceState {
            kind: DeviceKind::AerationBasin,
            id: self.id.clone(),
            power_kw: self.power_kw,
            dependent_attribute: self.dissolved_oxygen,
        }
    }

    pub fn apply(&mut self, setpoint: &DeviceSetpoint) {
        self.optimized_power_kw = Some(setpoint.power_kw);
        self.optimized_dissolved_oxygen = Some(setpoint.dependent_attribute);
    }

    pub fn is_optimized(&self) -> bool {
        self.optimized_power_kw.is_some()
    }
}
