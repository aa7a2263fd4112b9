//! A small SI-flavored unit registry for quantity arithmetic.
//!
//! Protocols express durations, volumes, temperatures and similar
//! measurements as `magnitude unit` pairs (e.g. `30 sec`, `2.5 mL`). Units
//! are tracked by dimension so that incompatible arithmetic (adding seconds
//! to milliliters) is rejected rather than silently producing a number.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A physical dimension: time, volume, mass, temperature, or a dimensionless
/// count. Kept flat (no compound dimensions like length/time) because the
/// protocol surface only ever names a handful of base quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    /// Seconds.
    Time,
    /// Liters.
    Volume,
    /// Grams.
    Mass,
    /// Degrees Celsius.
    Temperature,
    /// No physical dimension.
    Count,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Dimension::Time => "time",
            Dimension::Volume => "volume",
            Dimension::Mass => "mass",
            Dimension::Temperature => "temperature",
            Dimension::Count => "count",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy)]
struct UnitDef {
    dimension: Dimension,
    /// Multiplier to the dimension's base unit (seconds, liters, grams).
    to_base: f64,
}

static UNITS: Lazy<HashMap<&'static str, UnitDef>> = Lazy::new(|| {
    use Dimension::*;
    HashMap::from([
        ("ms", UnitDef { dimension: Time, to_base: 1e-3 }),
        ("sec", UnitDef { dimension: Time, to_base: 1.0 }),
        ("s", UnitDef { dimension: Time, to_base: 1.0 }),
        ("min", UnitDef { dimension: Time, to_base: 60.0 }),
        ("hr", UnitDef { dimension: Time, to_base: 3600.0 }),
        ("uL", UnitDef { dimension: Volume, to_base: 1e-6 }),
        ("mL", UnitDef { dimension: Volume, to_base: 1e-3 }),
        ("L", UnitDef { dimension: Volume, to_base: 1.0 }),
        ("mg", UnitDef { dimension: Mass, to_base: 1e-3 }),
        ("g", UnitDef { dimension: Mass, to_base: 1.0 }),
        ("kg", UnitDef { dimension: Mass, to_base: 1e3 }),
        ("degC", UnitDef { dimension: Temperature, to_base: 1.0 }),
    ])
});

/// Error raised when a unit name is unknown or an operation mixes
/// incompatible dimensions.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum UnitError {
    /// The unit suffix is not registered.
    #[error("unknown unit {0:?}")]
    UnknownUnit(String),
    /// Two quantities with incompatible dimensions were combined.
    #[error("incompatible dimensions: {0} and {1}")]
    DimensionMismatch(Dimension, Dimension),
}

/// Look up a unit's dimension and its multiplier to that dimension's base
/// unit.
pub fn lookup_unit(name: &str) -> Result<(Dimension, f64), UnitError> {
    UNITS
        .get(name)
        .map(|def| (def.dimension, def.to_base))
        .ok_or_else(|| UnitError::UnknownUnit(name.to_string()))
}

/// A magnitude tagged with a unit, normalized internally to its dimension's
/// base unit so that arithmetic between compatible units (e.g. `sec` and
/// `min`) is exact regardless of which unit either operand was written in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    /// Magnitude expressed in the dimension's base unit.
    base_magnitude: f64,
    dimension: Dimension,
}

impl Quantity {
    /// Construct a quantity from a magnitude expressed in `unit`.
    pub fn new(magnitude: f64, unit: &str) -> Result<Self, UnitError> {
        let (dimension, to_base) = lookup_unit(unit)?;
        Ok(Self { base_magnitude: magnitude * to_base, dimension })
    }

    /// A dimensionless count.
    pub fn count(magnitude: f64) -> Self {
        Self { base_magnitude: magnitude, dimension: Dimension::Count }
    }

    /// This quantity's dimension.
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// The magnitude expressed in `unit`, if `unit` shares this quantity's
    /// dimension.
    pub fn magnitude_as(&self, unit: &str) -> Result<f64, UnitError> {
        let (dimension, to_base) = lookup_unit(unit)?;
        if dimension != self.dimension {
            return Err(UnitError::DimensionMismatch(self.dimension, dimension));
        }
        Ok(self.base_magnitude / to_base)
    }

    /// Magnitude in the dimension's base unit (seconds/liters/grams/etc).
    pub fn base_magnitude(&self) -> f64 {
        self.base_magnitude
    }

    /// Add two quantities; fails if their dimensions differ.
    pub fn add(self, other: Quantity) -> Result<Quantity, UnitError> {
        if self.dimension != other.dimension {
            return Err(UnitError::DimensionMismatch(self.dimension, other.dimension));
        }
        Ok(Quantity { base_magnitude: self.base_magnitude + other.base_magnitude, dimension: self.dimension })
    }

    /// Subtract two quantities; fails if their dimensions differ.
    pub fn sub(self, other: Quantity) -> Result<Quantity, UnitError> {
        if self.dimension != other.dimension {
            return Err(UnitError::DimensionMismatch(self.dimension, other.dimension));
        }
        Ok(Quantity { base_magnitude: self.base_magnitude - other.base_magnitude, dimension: self.dimension })
    }

    /// Scale a quantity by a dimensionless factor.
    pub fn scale(self, factor: f64) -> Quantity {
        Quantity { base_magnitude: self.base_magnitude * factor, dimension: self.dimension }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_units_add_exactly() {
        let a = Quantity::new(90.0, "sec").unwrap();
        let b = Quantity::new(1.0, "min").unwrap();
        let sum = a.add(b).unwrap();
        assert_eq!(sum.magnitude_as("sec").unwrap(), 150.0);
    }

    #[test]
    fn incompatible_units_reject_addition() {
        let time = Quantity::new(1.0, "sec").unwrap();
        let volume = Quantity::new(1.0, "mL").unwrap();
        assert!(time.add(volume).is_err());
    }

    #[test]
    fn unknown_unit_is_an_error() {
        assert!(Quantity::new(1.0, "furlong").is_err());
    }
}
