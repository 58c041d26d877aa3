//! Catalog epochs, angular units and proper-motion propagation.
//!
//! Positions are propagated linearly on the tangent plane. The RA rate is
//! scaled by the cosine of the mean declination over the interval, which
//! keeps propagation from E1 to E2 and back to E1 exact up to rounding.

use std::fmt;
use std::str::FromStr;

use crate::category::Category;
use crate::table::{Column, DataType, ResultTable, TableError, Value};

/// Milliarcseconds per degree.
const MAS_PER_DEGREE: f64 = 3_600_000.0;

/// Name of the propagated RA column appended to cross-match sources.
pub const ADJUSTED_RA: &str = "adjusted_ra";
/// Name of the propagated Dec column appended to cross-match sources.
pub const ADJUSTED_DEC: &str = "adjusted_dec";

/// Errors from epoch parsing and astrometric adjustment.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AstrometryError {
    #[error("Invalid epoch: {0}")]
    InvalidEpoch(String),
    #[error("Catalog {0} has no reference epoch")]
    UndefinedEpoch(String),
    #[error("Missing column: {0}")]
    MissingColumn(String),
    #[error("Unsupported unit '{unit}' for column {column}")]
    UnsupportedUnit { column: String, unit: String },
    #[error("Non-numeric value in column {column} at row {row}")]
    NonNumeric { column: String, row: usize },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// A reference epoch expressed as a Julian year (e.g. J2016.0).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Epoch(f64);

impl Epoch {
    pub const fn julian_year(year: f64) -> Self {
        Self(year)
    }

    pub fn year(&self) -> f64 {
        self.0
    }

    /// Years elapsed from `self` to `later`.
    pub fn years_until(&self, later: Epoch) -> f64 {
        later.0 - self.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "J{:.1}", self.0)
    }
}

impl FromStr for Epoch {
    type Err = AstrometryError;

    /// Accepts `J2016.0`, `j2000` or a bare year.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('J')
            .or_else(|| trimmed.strip_prefix('j'))
            .unwrap_or(trimmed);
        digits
            .parse::<f64>()
            .ok()
            .filter(|y| y.is_finite())
            .map(Epoch)
            .ok_or_else(|| AstrometryError::InvalidEpoch(s.to_string()))
    }
}

/// An astrometric position with proper motion, in canonical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyMotion {
    /// Degrees
    pub ra: f64,
    /// Degrees
    pub dec: f64,
    /// mas/yr, including the cos(Dec) factor
    pub pm_ra_cosdec: f64,
    /// mas/yr
    pub pm_dec: f64,
}

impl SkyMotion {
    /// Propagate the position by `dt_years`, returning (RA, Dec) in degrees.
    ///
    /// RA is wrapped into [0, 360). A declination carried past a pole is
    /// reflected back over it, with RA moved to the opposite meridian.
    /// Returns `None` when there is RA motion and the mean declination sits
    /// on a pole, where that motion is undefined.
    pub fn propagate(&self, dt_years: f64) -> Option<(f64, f64)> {
        let mut dec = self.dec + self.pm_dec * dt_years / MAS_PER_DEGREE;
        let mut ra = self.ra;
        if self.pm_ra_cosdec != 0.0 {
            let cos_dec = ((self.dec + dec) / 2.0).to_radians().cos();
            if cos_dec.abs() < 1e-12 {
                return None;
            }
            ra += self.pm_ra_cosdec * dt_years / MAS_PER_DEGREE / cos_dec;
        }

        if dec > 90.0 {
            dec = 180.0 - dec;
            ra += 180.0;
        } else if dec < -90.0 {
            dec = -180.0 - dec;
            ra += 180.0;
        }
        Some((wrap_ra(ra), dec))
    }
}

/// Wrap RA into [0, 360). `rem_euclid` rounds tiny negatives up to 360.
fn wrap_ra(ra: f64) -> f64 {
    let wrapped = ra.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Canonical spelling of a unit string: lower case, without whitespace and
/// exponent markers, so `mas.yr**-1`, `mas.yr^-1` and `mas.yr-1` agree.
fn normalize_unit(unit: &str) -> String {
    unit.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .replace("**", "")
        .replace('^', "")
        .to_lowercase()
}

/// Degrees per unit for position-like columns.
fn degrees_per_unit(unit: &str, allow_hours: bool) -> Option<f64> {
    match normalize_unit(unit).as_str() {
        "deg" | "degree" | "degrees" => Some(1.0),
        "rad" | "radian" | "radians" => Some(180.0 / std::f64::consts::PI),
        "arcmin" => Some(1.0 / 60.0),
        "arcsec" => Some(1.0 / 3600.0),
        "mas" => Some(1.0 / MAS_PER_DEGREE),
        "h" | "hourangle" if allow_hours => Some(15.0),
        _ => None,
    }
}

/// Milliarcseconds-per-year per unit for proper-motion columns.
fn mas_per_year_per_unit(unit: &str) -> Option<f64> {
    match normalize_unit(unit).as_str() {
        "mas/yr" | "mas.yr-1" | "mas/a" | "mas.a-1" => Some(1.0),
        "arcsec/yr" | "arcsec.yr-1" | "arcsec/a" => Some(1000.0),
        "deg/yr" | "deg.yr-1" => Some(MAS_PER_DEGREE),
        _ => None,
    }
}

/// Column values converted to a canonical unit. Columns without a declared
/// unit are assumed to be canonical already.
fn canonical_column(
    table: &ResultTable,
    name: &str,
    factor_for: impl Fn(&str) -> Option<f64>,
) -> Result<Vec<Option<f64>>, AstrometryError> {
    let column = table
        .column(name)
        .ok_or_else(|| AstrometryError::MissingColumn(name.to_string()))?;

    let factor = match column.unit.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(unit) => factor_for(unit).ok_or_else(|| AstrometryError::UnsupportedUnit {
            column: name.to_string(),
            unit: unit.to_string(),
        })?,
        None => 1.0,
    };

    let values = table
        .column_values(name)
        .map_err(|_| AstrometryError::MissingColumn(name.to_string()))?;

    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            Value::Null => Ok(None),
            Value::Float(v) if v.is_nan() => Ok(None),
            other => other
                .as_f64()
                .map(|v| Some(v * factor))
                .ok_or_else(|| AstrometryError::NonNumeric {
                    column: name.to_string(),
                    row,
                }),
        })
        .collect()
}

/// Propagate every row of `table` from `from` to `to` and append the
/// [`ADJUSTED_RA`] and [`ADJUSTED_DEC`] columns, in degrees.
///
/// The table must carry the canonical RA, Dec, PMRA and PMDec columns. Rows
/// without a position get null adjusted values; rows without proper motion
/// are treated as stationary. Rows whose RA motion cannot be propagated
/// because they sit on a pole also get null adjusted values.
pub fn adjust_to_epoch(
    table: &mut ResultTable,
    from: Epoch,
    to: Epoch,
) -> Result<(), AstrometryError> {
    let ra = canonical_column(table, Category::RA.name(), |u| degrees_per_unit(u, true))?;
    let dec = canonical_column(table, Category::Dec.name(), |u| degrees_per_unit(u, false))?;
    let pmra = canonical_column(table, Category::PMRA.name(), mas_per_year_per_unit)?;
    let pmdec = canonical_column(table, Category::PMDec.name(), mas_per_year_per_unit)?;

    let dt_years = from.years_until(to);
    let mut adjusted_ra = Vec::with_capacity(ra.len());
    let mut adjusted_dec = Vec::with_capacity(ra.len());

    for row in 0..ra.len() {
        let (Some(ra_deg), Some(dec_deg)) = (ra[row], dec[row]) else {
            adjusted_ra.push(Value::Null);
            adjusted_dec.push(Value::Null);
            continue;
        };
        let motion = SkyMotion {
            ra: ra_deg,
            dec: dec_deg,
            pm_ra_cosdec: pmra[row].unwrap_or(0.0),
            pm_dec: pmdec[row].unwrap_or(0.0),
        };
        match motion.propagate(dt_years) {
            Some((new_ra, new_dec)) => {
                adjusted_ra.push(Value::Float(new_ra));
                adjusted_dec.push(Value::Float(new_dec));
            }
            None => {
                log::warn!("Row {row} sits on a pole with RA motion, leaving it unadjusted");
                adjusted_ra.push(Value::Null);
                adjusted_dec.push(Value::Null);
            }
        }
    }

    log::debug!(
        "Propagated {} positions from {} to {} ({:+.3} yr)",
        ra.len(),
        from,
        to,
        dt_years
    );

    table.append_column(
        Column::new(ADJUSTED_RA, DataType::Double).with_unit("deg"),
        adjusted_ra,
    )?;
    table.append_column(
        Column::new(ADJUSTED_DEC, DataType::Double).with_unit("deg"),
        adjusted_dec,
    )?;
    Ok(())
}
