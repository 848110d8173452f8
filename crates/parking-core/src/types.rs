use crate::plate::Plate;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of the vehicle table, keyed by plate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRecord {
    pub plate: Plate,
    /// Set on first registration only.
    pub customer_name: Option<String>,
    /// Set on first registration only.
    pub car_model: Option<String>,
    /// Incremented on every entry, never reset.
    pub visit_count: u32,
    /// Entry time of the current (or latest) visit.
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    /// Fee computed at the latest exit; `None` until the first exit.
    pub amount_due: Option<f64>,
    pub paid: bool,
}

/// Customer metadata captured on a first registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerInfo {
    pub name: String,
    pub car_model: String,
}

impl CustomerInfo {
    pub fn new(name: impl Into<String>, car_model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            car_model: car_model.into(),
        }
    }
}
