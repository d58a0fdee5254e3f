use phf::{Map, phf_map};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Broad classification of a residue template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResidueKind {
    Protein,
    NucleicAcid,
    Solvent,
    #[default]
    Unknown,
}

static OFF_TAGS: Map<&'static str, ResidueKind> = phf_map! {
    "p" => ResidueKind::Protein,
    "n" => ResidueKind::NucleicAcid,
    "w" => ResidueKind::Solvent,
    "?" => ResidueKind::Unknown,
};

#[derive(Debug, Error)]
#[error("invalid residue kind '{0}'")]
pub struct ParseResidueKindError(pub String);

impl ResidueKind {
    /// The single-letter `restype` tag of OFF `residues` rows.
    pub fn off_tag(self) -> &'static str {
        match self {
            Self::Protein => "p",
            Self::NucleicAcid => "n",
            Self::Solvent => "w",
            Self::Unknown => "?",
        }
    }

    /// Resolves an OFF `restype` tag; unrecognized tags fall back to `Unknown`.
    pub fn from_off_tag(tag: &str) -> Self {
        OFF_TAGS.get(tag).copied().unwrap_or_default()
    }

    /// The molecule type written to `@<TRIPOS>MOLECULE` records.
    pub fn mol2_molecule_type(self) -> &'static str {
        match self {
            Self::Protein => "PROTEIN",
            Self::NucleicAcid => "NUCLEIC_ACID",
            Self::Solvent | Self::Unknown => "SMALL",
        }
    }
}

impl FromStr for ResidueKind {
    type Err = ParseResidueKindError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PROTEIN" | "BIOPOLYMER" => Ok(Self::Protein),
            "NUCLEIC_ACID" | "NUCLEIC" => Ok(Self::NucleicAcid),
            "SOLVENT" => Ok(Self::Solvent),
            "UNKNOWN" | "SMALL" => Ok(Self::Unknown),
            _ => Err(ParseResidueKindError(s.to_string())),
        }
    }
}

impl fmt::Display for ResidueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Protein => "PROTEIN",
                Self::NucleicAcid => "NUCLEIC_ACID",
                Self::Solvent => "SOLVENT",
                Self::Unknown => "UNKNOWN",
            }
        )
    }
}
