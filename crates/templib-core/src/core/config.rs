use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

const MAX_OUTPUT_PRECISION: usize = 12;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

/// Settings shared by the library codecs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    /// Largest charge difference at which two sub-unit atoms still count as equal.
    pub charge_tolerance: f64,
    /// Number of inconsistent sub-units tolerated in one multi-unit entry before
    /// reading fails. `None` only warns.
    pub max_inconsistent_subunits: Option<usize>,
    /// Decimals written for coordinates and velocities.
    pub position_precision: usize,
    /// Decimals written for charges; `None` writes the shortest exact representation.
    pub charge_precision: Option<usize>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            charge_tolerance: 1e-4,
            max_inconsistent_subunits: None,
            position_precision: 6,
            charge_precision: None,
        }
    }
}

impl CodecConfig {
    /// Starts a builder; unset values fall back to the defaults.
    pub fn builder() -> CodecConfigBuilder {
        CodecConfigBuilder::new()
    }

    /// Loads a configuration from a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Renders a charge at `charge_precision` decimals, or exactly when unset.
    pub fn format_charge(&self, charge: f64) -> String {
        match self.charge_precision {
            Some(precision) => format!("{:.*}", precision, charge),
            None => format!("{}", charge),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.charge_tolerance.is_finite() || self.charge_tolerance < 0.0 {
            return Err(ConfigError::InvalidValue {
                parameter: "charge_tolerance",
                reason: format!("{} is not a non-negative number", self.charge_tolerance),
            });
        }
        if self.position_precision > MAX_OUTPUT_PRECISION {
            return Err(ConfigError::InvalidValue {
                parameter: "position_precision",
                reason: format!("must not exceed {}", MAX_OUTPUT_PRECISION),
            });
        }
        if self
            .charge_precision
            .is_some_and(|precision| precision > MAX_OUTPUT_PRECISION)
        {
            return Err(ConfigError::InvalidValue {
                parameter: "charge_precision",
                reason: format!("must not exceed {}", MAX_OUTPUT_PRECISION),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct CodecConfigBuilder {
    charge_tolerance: Option<f64>,
    max_inconsistent_subunits: Option<usize>,
    position_precision: Option<usize>,
    charge_precision: Option<usize>,
}

impl CodecConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest charge difference tolerated between repeated subunits.
    pub fn charge_tolerance(mut self, tolerance: f64) -> Self {
        self.charge_tolerance = Some(tolerance);
        self
    }
    /// Number of inconsistent subunits tolerated per entry before reading fails.
    pub fn max_inconsistent_subunits(mut self, limit: usize) -> Self {
        self.max_inconsistent_subunits = Some(limit);
        self
    }
    /// Decimals written for coordinates and velocities.
    pub fn position_precision(mut self, precision: usize) -> Self {
        self.position_precision = Some(precision);
        self
    }
    /// Writes charges with a fixed number of decimals instead of the shortest form.
    pub fn charge_precision(mut self, precision: usize) -> Self {
        self.charge_precision = Some(precision);
        self
    }

    /// Validates the settings.
    pub fn build(self) -> Result<CodecConfig, ConfigError> {
        let defaults = CodecConfig::default();
        let config = CodecConfig {
            charge_tolerance: self.charge_tolerance.unwrap_or(defaults.charge_tolerance),
            max_inconsistent_subunits: self.max_inconsistent_subunits,
            position_precision: self
                .position_precision
                .unwrap_or(defaults.position_precision),
            charge_precision: self.charge_precision,
        };
        config.validate()?;
        Ok(config)
    }
}
