//! Catalog-agnostic filter vocabulary.
//!
//! A [`Category`] names a physical quantity that a catalog may expose. The
//! canonical unit of each category is a contract between callers and catalog
//! descriptors and is not carried at runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Filterable and selectable astrophysical quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Right ascension, degrees
    RA,
    /// Declination, degrees
    Dec,
    /// Proper motion in RA including the cos(Dec) factor, mas/yr
    PMRA,
    /// Proper motion in Dec, mas/yr
    PMDec,
    /// Parallax, mas
    Parallax,
    /// Total proper motion, mas/yr
    ProperMotion,
    /// G-band mean magnitude
    GMagnitude,
    /// Blue photometer magnitude
    BPMagnitude,
    /// Red photometer magnitude
    RPMagnitude,
    /// Radial velocity, km/s
    RadialVelocity,
    /// Mass, solar masses
    Mass,
    /// Radius, solar radii
    Radius,
    /// Luminosity, solar luminosities
    Luminosity,
    /// Effective temperature, K
    Temperature,
    /// Surface gravity, log g
    Gravity,
    /// Spatial cone filter (center RA/Dec and radius, degrees)
    ObjectsInCircle,
}

impl Category {
    pub const ALL: [Category; 16] = [
        Category::RA,
        Category::Dec,
        Category::PMRA,
        Category::PMDec,
        Category::Parallax,
        Category::ProperMotion,
        Category::GMagnitude,
        Category::BPMagnitude,
        Category::RPMagnitude,
        Category::RadialVelocity,
        Category::Mass,
        Category::Radius,
        Category::Luminosity,
        Category::Temperature,
        Category::Gravity,
        Category::ObjectsInCircle,
    ];

    /// Canonical name, used as the projected column alias.
    pub fn name(&self) -> &'static str {
        match self {
            Category::RA => "RA",
            Category::Dec => "Dec",
            Category::PMRA => "PMRA",
            Category::PMDec => "PMDec",
            Category::Parallax => "Parallax",
            Category::ProperMotion => "ProperMotion",
            Category::GMagnitude => "GMagnitude",
            Category::BPMagnitude => "BPMagnitude",
            Category::RPMagnitude => "RPMagnitude",
            Category::RadialVelocity => "RadialVelocity",
            Category::Mass => "Mass",
            Category::Radius => "Radius",
            Category::Luminosity => "Luminosity",
            Category::Temperature => "Temperature",
            Category::Gravity => "Gravity",
            Category::ObjectsInCircle => "ObjectsInCircle",
        }
    }

    /// Name used in filter keys (`min_<key>` / `max_<key>`).
    pub fn filter_key(&self) -> String {
        self.name().to_ascii_lowercase()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Recognized object classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Star,
    Galaxy,
    Quasar,
    Undefined,
}

impl ObjectType {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectType::Star => "Star",
            ObjectType::Galaxy => "Galaxy",
            ObjectType::Quasar => "Quasar",
            ObjectType::Undefined => "",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObjectType {
    type Err = String;

    /// Case-insensitive; an empty string is [`ObjectType::Undefined`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "star" => Ok(ObjectType::Star),
            "galaxy" => Ok(ObjectType::Galaxy),
            "quasar" => Ok(ObjectType::Quasar),
            "" => Ok(ObjectType::Undefined),
            other => Err(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_keys_are_unique() {
        let mut keys: Vec<String> = Category::ALL.iter().map(|c| c.filter_key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), Category::ALL.len());
    }

    #[test]
    fn test_object_type_parsing() {
        assert_eq!("STAR".parse::<ObjectType>(), Ok(ObjectType::Star));
        assert_eq!(" galaxy ".parse::<ObjectType>(), Ok(ObjectType::Galaxy));
        assert_eq!("".parse::<ObjectType>(), Ok(ObjectType::Undefined));
        assert_eq!("nebula".parse::<ObjectType>(), Err("nebula".to_string()));
    }
}
