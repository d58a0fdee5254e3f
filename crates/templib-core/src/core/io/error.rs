use crate::core::models::error::TemplateError;
use std::io;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{format} parse error on line {line}: {details}")]
    Parse {
        format: &'static str,
        line: usize,
        details: String,
    },

    #[error("Missing required section '{section}' in unit '{unit}'")]
    MissingSection { unit: String, section: String },

    #[error("Unknown format keyword '{0}' (expected one of: offlib, off, lib, mol2, mol3)")]
    UnknownFormat(String),

    #[error("Cannot infer a template format from the extension of '{path}'")]
    UnrecognizedExtension { path: String },

    #[error("Expected a single molecule record but found {count}")]
    MultiRecord { count: usize },

    #[error("Residue '{residue}' has {count} connections; at most {max} can be written")]
    TooManyConnections {
        residue: String,
        count: usize,
        max: usize,
    },

    #[error("Unit '{unit}' has {count} inconsistent sub-units (limit is {limit})")]
    InconsistentUnit {
        unit: String,
        count: usize,
        limit: usize,
    },

    #[error("Invalid template data in {context}: {source}")]
    Template {
        context: String,
        #[source]
        source: TemplateError,
    },
}

impl IoError {
    pub(crate) fn parse(format: &'static str, line: usize, details: impl Into<String>) -> Self {
        Self::Parse {
            format,
            line,
            details: details.into(),
        }
    }

    pub(crate) fn template(context: impl Into<String>, source: TemplateError) -> Self {
        Self::Template {
            context: context.into(),
            source,
        }
    }
}

/// A non-fatal disagreement between a sub-unit of a multi-unit entry and the
/// first sub-unit with the same residue name.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyWarning {
    pub unit: String,
    /// Zero-based position of the offending sub-unit within its unit.
    pub subunit: usize,
    pub details: String,
}

/// Diagnostics collected while reading a file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadReport {
    pub warnings: Vec<ConsistencyWarning>,
}

impl ReadReport {
    /// Whether reading produced no warnings.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub(crate) fn warn(&mut self, unit: &str, subunit: usize, details: String) {
        warn!(unit, subunit, "{}", details);
        self.warnings.push(ConsistencyWarning {
            unit: unit.to_string(),
            subunit,
            details,
        });
    }
}
