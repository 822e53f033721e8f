use serde::{Deserialize, Serialize};

/// Grid conditions observed for one tick.
///
/// Read-only context: the optimizer never treats demand or price as a
/// decision variable, they are carried through for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    /// Grid demand in kW.
    #[serde(rename = "demand")]
    pub demand_kw: f64,
    /// Energy price in $/kWh.
    #[serde(rename = "price")]
    pub price_per_kwh: f64,
}

impl GridSnapshot {
    pub fn new(demand_kw: f64, price_per_kwh: f64) -> Self {
        Self {
            demand_kw,
            price_per_kwh,
        }
    }

    /// Cost of running `load_kw` for one hour at the current price.
    pub fn hourly_cost(&self, load_kw: f64) -> f64 {
        load_kw * self.price_per_kwh
    }

    pub fn is_finite(&self) -> bool {
        self.demand_kw.is_finite() && self.price_per_kwh.is_finite()
    }
}
