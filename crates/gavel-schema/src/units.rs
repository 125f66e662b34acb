//! Exact unit-of-measure conversion for dimensioned quantities.
//!
//! Aggregate invariants compare quantities recorded in different units, so
//! every quantity is normalized into a common basis before summation. The
//! conversion tables are static and exact; any pair of units without a
//! defined conversion path is an [`UnitError::Unconvertible`] rejection,
//! never a silent assumption of equal units.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Tolerance for equality and less-than-or-equal comparisons on converted values.
pub const EPSILON: f64 = 1e-9;

/// Physical dimension of a quantity. The conversion table is keyed per dimension,
/// so a mass unit never converts into a length unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Mass,
    Length,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Mass => write!(f, "mass"),
            Dimension::Length => write!(f, "length"),
        }
    }
}

/// A dimensioned value paired with its unit-of-measure string.
///
/// The value and unit always travel together; a quantity with a blank unit is
/// a field-level validation error, not a conversion error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("no conversion path from '{from}' to '{to}' for dimension {dimension}")]
    Unconvertible {
        from: String,
        to: String,
        dimension: Dimension,
    },
}

/// Factor from the given unit into the dimension's base unit (kg for mass, m for length).
///
/// Unit strings are matched after trimming and lowercasing. Factors are the
/// exact values from the international definitions of the pound and the inch.
fn base_factor(unit: &str, dimension: Dimension) -> Option<f64> {
    let unit = unit.trim().to_lowercase();
    match dimension {
        Dimension::Mass => match unit.as_str() {
            "mg" => Some(1e-6),
            "g" => Some(1e-3),
            "kg" => Some(1.0),
            "t" | "tonne" => Some(1000.0),
            "lb" | "lbs" => Some(0.453_592_37),
            "oz" => Some(0.028_349_523_125),
            _ => None,
        },
        Dimension::Length => match unit.as_str() {
            "mm" => Some(0.001),
            "cm" => Some(0.01),
            "m" => Some(1.0),
            "km" => Some(1000.0),
            "in" => Some(0.0254),
            "ft" => Some(0.3048),
            _ => None,
        },
    }
}

/// Convert `value` from one unit into another within a single dimension.
pub fn convert(value: f64, from: &str, to: &str, dimension: Dimension) -> Result<f64, UnitError> {
    let unconvertible = || UnitError::Unconvertible {
        from: from.to_owned(),
        to: to.to_owned(),
        dimension,
    };
    let from_factor = base_factor(from, dimension).ok_or_else(unconvertible)?;
    let to_factor = base_factor(to, dimension).ok_or_else(unconvertible)?;
    Ok(value * from_factor / to_factor)
}
