//! Unit table for unit-annotated bindings.
//!
//! Conversion is a linear scale within a dimension. Each unit stores its
//! factor to the SI unit of that dimension, so converting `from → to` is
//! `value * from.scale / to.scale`.

use std::f64::consts::PI;

use crate::error::{SimError, SimResult};

/// Physical dimension of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Pure number.
    Dimensionless,
    /// Time.
    Time,
    /// Length.
    Length,
    /// Mass.
    Mass,
    /// Force.
    Force,
    /// Plane angle.
    Angle,
    /// Linear velocity.
    Velocity,
    /// Angular velocity.
    AngularVelocity,
    /// Linear acceleration.
    Acceleration,
    /// Frequency.
    Frequency,
    /// Area.
    Area,
    /// Mass density.
    Density,
    /// Spring stiffness.
    Stiffness,
    /// Viscous damping.
    Damping,
}

/// One entry in the unit table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit {
    /// Symbol as written in bindings.
    pub symbol: &'static str,
    /// Dimension.
    pub dimension: Dimension,
    /// Factor to the SI unit of the dimension.
    pub scale: f64,
}

const fn unit(symbol: &'static str, dimension: Dimension, scale: f64) -> Unit {
    Unit {
        symbol,
        dimension,
        scale,
    }
}

const LBF: f64 = 4.448_221_615_260_5;

static UNITS: &[Unit] = &[
    unit("--", Dimension::Dimensionless, 1.0),
    unit("1", Dimension::Dimensionless, 1.0),
    unit("s", Dimension::Time, 1.0),
    unit("ms", Dimension::Time, 1.0e-3),
    unit("min", Dimension::Time, 60.0),
    unit("hr", Dimension::Time, 3600.0),
    unit("m", Dimension::Length, 1.0),
    unit("cm", Dimension::Length, 0.01),
    unit("mm", Dimension::Length, 0.001),
    unit("km", Dimension::Length, 1000.0),
    unit("ft", Dimension::Length, 0.3048),
    unit("in", Dimension::Length, 0.0254),
    unit("kg", Dimension::Mass, 1.0),
    unit("g", Dimension::Mass, 1.0e-3),
    unit("lbm", Dimension::Mass, 0.453_592_37),
    unit("N", Dimension::Force, 1.0),
    unit("kN", Dimension::Force, 1000.0),
    unit("lbf", Dimension::Force, LBF),
    unit("rad", Dimension::Angle, 1.0),
    unit("d", Dimension::Angle, PI / 180.0),
    unit("deg", Dimension::Angle, PI / 180.0),
    unit("rev", Dimension::Angle, 2.0 * PI),
    unit("m/s", Dimension::Velocity, 1.0),
    unit("km/s", Dimension::Velocity, 1000.0),
    unit("km/hr", Dimension::Velocity, 1.0 / 3.6),
    unit("ft/s", Dimension::Velocity, 0.3048),
    unit("rad/s", Dimension::AngularVelocity, 1.0),
    unit("d/s", Dimension::AngularVelocity, PI / 180.0),
    unit("rev/s", Dimension::AngularVelocity, 2.0 * PI),
    unit("rpm", Dimension::AngularVelocity, 2.0 * PI / 60.0),
    unit("m/s2", Dimension::Acceleration, 1.0),
    unit("ft/s2", Dimension::Acceleration, 0.3048),
    unit("1/s", Dimension::Frequency, 1.0),
    unit("Hz", Dimension::Frequency, 1.0),
    unit("m2", Dimension::Area, 1.0),
    unit("ft2", Dimension::Area, 0.092_903_04),
    unit("kg/m3", Dimension::Density, 1.0),
    unit("N/m", Dimension::Stiffness, 1.0),
    unit("lbf/ft", Dimension::Stiffness, LBF / 0.3048),
    unit("N.s/m", Dimension::Damping, 1.0),
];

/// Look up a unit by symbol.
#[must_use]
pub fn lookup(symbol: &str) -> Option<&'static Unit> {
    UNITS.iter().find(|u| u.symbol == symbol.trim())
}

fn resolve(symbol: Option<&str>) -> SimResult<&'static Unit> {
    let symbol = symbol.unwrap_or("--");
    lookup(symbol).ok_or_else(|| SimError::UnitMismatch {
        from: symbol.to_string(),
        to: "known unit".to_string(),
    })
}

/// Factor that converts a value in `from` into `to`.
///
/// `None` means dimensionless.
///
/// # Errors
///
/// Returns `SimError::UnitMismatch` if either unit is unknown or the
/// dimensions differ.
pub fn conversion_factor(from: Option<&str>, to: Option<&str>) -> SimResult<f64> {
    let mismatch = || SimError::UnitMismatch {
        from: from.unwrap_or("--").to_string(),
        to: to.unwrap_or("--").to_string(),
    };
    let source = resolve(from).map_err(|_| mismatch())?;
    let target = resolve(to).map_err(|_| mismatch())?;
    if source.dimension != target.dimension {
        return Err(mismatch());
    }
    Ok(source.scale / target.scale)
}

/// Convert a value between units.
///
/// # Errors
///
/// Returns `SimError::UnitMismatch` if the units are not convertible.
pub fn convert(value: f64, from: Option<&str>, to: Option<&str>) -> SimResult<f64> {
    Ok(value * conversion_factor(from, to)?)
}

/// A value tagged with the unit it was written in.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    /// Numeric value in `unit`.
    pub value: f64,
    /// Unit symbol.
    pub unit: String,
}

impl Quantity {
    /// Value converted into `native`.
    ///
    /// # Errors
    ///
    /// Returns `SimError::UnitMismatch` if the units are not convertible.
    pub fn to(&self, native: Option<&str>) -> SimResult<f64> {
        convert(self.value, Some(&self.unit), native)
    }
}

/// Tag a value with a unit, e.g. `attach_units("d", -90.0)`.
#[must_use]
pub fn attach_units(unit: &str, value: f64) -> Quantity {
    Quantity {
        value,
        unit: unit.to_string(),
    }
}

/// Check that a unit symbol is in the table.
///
/// # Errors
///
/// Returns `SimError::UnitMismatch` if the symbol is unknown.
pub fn validate(symbol: &str) -> SimResult<()> {
    resolve(Some(symbol)).map(|_| ())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_degrees_to_radians() {
        let rad = attach_units("d", -90.0).to(Some("rad")).unwrap();
        assert!((rad + PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_rev_per_second_to_rad_per_second() {
        let w = convert(30.0, Some("rev/s"), Some("rad/s")).unwrap();
        assert!((w - 60.0 * PI).abs() < 1e-9);
    }

    #[test]
    fn test_imperial_length() {
        let m = convert(10.0, Some("ft"), Some("m")).unwrap();
        assert!((m - 3.048).abs() < 1e-12);
    }

    #[test]
    fn test_same_unit_is_identity() {
        assert_eq!(conversion_factor(Some("s"), Some("s")).unwrap(), 1.0);
        assert_eq!(conversion_factor(None, Some("--")).unwrap(), 1.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = convert(1.0, Some("kg"), Some("s")).unwrap_err();
        assert!(matches!(err, SimError::UnitMismatch { .. }));
        assert!(convert(1.0, Some("m"), None).is_err());
    }

    #[test]
    fn test_unknown_unit() {
        assert!(convert(1.0, Some("furlong"), Some("m")).is_err());
        assert!(validate("furlong").is_err());
        assert!(validate("rev/s").is_ok());
    }
}
