use super::ids::AtomId;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BondOrder {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
}

#[derive(Debug, Error)]
#[error("invalid bond order '{0}'")]
pub struct ParseBondOrderError(pub String);

impl BondOrder {
    /// The SYBYL bond type code used in `@<TRIPOS>BOND` records.
    pub fn sybyl_code(self) -> &'static str {
        match self {
            Self::Single => "1",
            Self::Double => "2",
            Self::Triple => "3",
            Self::Aromatic => "ar",
        }
    }

    /// The integer stored in the `flags` column of OFF `connectivity` rows.
    pub fn off_flag(self) -> u32 {
        match self {
            Self::Single => 1,
            Self::Double => 2,
            Self::Triple => 3,
            Self::Aromatic => 4,
        }
    }

    /// Maps an OFF `connectivity` flag back to a bond order; unknown flags read as single.
    pub fn from_off_flag(flag: u32) -> Self {
        match flag {
            2 => Self::Double,
            3 => Self::Triple,
            4 => Self::Aromatic,
            _ => Self::Single,
        }
    }
}

impl FromStr for BondOrder {
    type Err = ParseBondOrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            // Amide, dummy, unknown and not-connected bonds carry no order information.
            "1" | "s" | "single" | "am" | "du" | "un" | "nc" => Ok(Self::Single),
            "2" | "d" | "double" => Ok(Self::Double),
            "3" | "t" | "triple" => Ok(Self::Triple),
            "ar" | "aromatic" => Ok(Self::Aromatic),
            _ => Err(ParseBondOrderError(s.to_string())),
        }
    }
}

impl fmt::Display for BondOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Single => "Single",
                Self::Double => "Double",
                Self::Triple => "Triple",
                Self::Aromatic => "Aromatic",
            }
        )
    }
}

/// A bond between two distinct atoms of the same template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bond {
    pub atom1: AtomId,
    pub atom2: AtomId,
    pub order: BondOrder,
}

impl Bond {
    pub fn new(atom1: AtomId, atom2: AtomId, order: BondOrder) -> Self {
        Self {
            atom1,
            atom2,
            order,
        }
    }
}
