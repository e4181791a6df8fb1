use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A cumulative meter value as reported by the physical meter.
///
/// Always finite and non-negative. This is the gate that keeps negative or
/// non-numeric input from ever reaching the ledger.
#[derive(Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Reading(f64);

impl Reading {
    pub fn new(value: f64) -> Result<Self, TypeError> {
        if value.is_nan() {
            return Err(TypeError::InvalidReading("reading is not a number".into()));
        }
        if value.is_infinite() {
            return Err(TypeError::InvalidReading("reading is not finite".into()));
        }
        if value < 0.0 {
            return Err(TypeError::InvalidReading(format!(
                "reading must be non-negative, got {value}"
            )));
        }
        // Normalize -0.0 so it never leaks into deltas.
        Ok(Self(value.abs()))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Consumption since `reference`, or the whole reading when there is no
    /// earlier reading to subtract.
    pub fn delta_from(&self, reference: Option<f64>) -> f64 {
        match reference {
            Some(previous) => self.0 - previous,
            None => self.0,
        }
    }
}

impl TryFrom<f64> for Reading {
    type Error = TypeError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Reading> for f64 {
    fn from(reading: Reading) -> Self {
        reading.0
    }
}

impl fmt::Debug for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reading({})", self.0)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
