use thiserror::Error;

/// Structural faults raised while building or mutating residue templates.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Cannot bond atom '{atom}' to itself")]
    SelfBond { atom: String },

    #[error("Atom {reference} does not belong to template '{template}'")]
    UnknownAtom { template: String, reference: String },

    #[error("Cannot insert atom '{atom}' into template '{template}': {reason}")]
    DuplicatePosition {
        template: String,
        atom: String,
        reason: &'static str,
    },

    #[error("Template '{template}' has no atoms")]
    EmptyTemplate { template: String },

    #[error("Charge precision {precision} exceeds the supported maximum of {max}")]
    InvalidPrecision { precision: usize, max: usize },

    #[error("Charge {value} in template '{template}' cannot be normalized to {precision} decimals")]
    ChargeOutOfRange {
        template: String,
        value: f64,
        precision: usize,
    },

    #[error("Residue {residue} is inconsistent with its structure: {details}")]
    InconsistentResidue { residue: usize, details: String },

    #[error("Coordinate matrix has {found} rows but template has {expected} atoms")]
    CoordinateShape { expected: usize, found: usize },
}

impl TemplateError {
    /// Returns `true` for errors caused by a dangling atom reference.
    pub fn is_reference_error(&self) -> bool {
        matches!(self, Self::UnknownAtom { .. })
    }
}
