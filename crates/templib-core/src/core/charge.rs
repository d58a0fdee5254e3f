use crate::core::models::error::TemplateError;
use crate::core::models::template::ResidueTemplate;
use std::cmp::Ordering;
use tracing::{debug, instrument};

/// Number of decimals charges are normalized to unless stated otherwise.
pub const DEFAULT_CHARGE_PRECISION: usize = 4;
/// Largest precision whose scaled charges still fit comfortably in an `f64` mantissa.
pub const MAX_CHARGE_PRECISION: usize = 12;
/// Scaled charges must stay integers an `f64` represents exactly (2^53).
const MAX_SCALED_CHARGE: f64 = 9_007_199_254_740_992.0;

impl ResidueTemplate {
    /// Shifts all charges by the same amount so that they sum to `target` and
    /// rounds them to `precision` decimals without breaking that sum.
    ///
    /// When `target` is `None` the current net charge rounded to the nearest
    /// integer is used. Rounding residue is handed out one `10^-precision` unit
    /// at a time to the atoms that were rounded the furthest.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::EmptyTemplate`] for a template without atoms and
    /// [`TemplateError::InvalidPrecision`] when `precision` exceeds
    /// [`MAX_CHARGE_PRECISION`]. A charge or target that is not finite, or too
    /// large to be counted in `10^-precision` units, gives
    /// [`TemplateError::ChargeOutOfRange`].
    #[instrument(skip_all, fields(template = %self.name, precision = precision))]
    pub fn fix_charges(
        &mut self,
        target: Option<f64>,
        precision: usize,
    ) -> Result<&mut Self, TemplateError> {
        if precision > MAX_CHARGE_PRECISION {
            return Err(TemplateError::InvalidPrecision {
                precision,
                max: MAX_CHARGE_PRECISION,
            });
        }
        if self.is_empty() {
            return Err(TemplateError::EmptyTemplate {
                template: self.name.clone(),
            });
        }

        let mut charges: Vec<f64> = self.iter().map(|atom| atom.charge).collect();
        let target = target.unwrap_or_else(|| self.net_charge().round());
        let limit = MAX_SCALED_CHARGE / 10f64.powi(precision as i32);
        let out_of_range = charges
            .iter()
            .copied()
            .chain(Some(target))
            .find(|q| !q.is_finite() || q.abs() > limit);
        if let Some(value) = out_of_range {
            return Err(TemplateError::ChargeOutOfRange {
                template: self.name.clone(),
                value,
                precision,
            });
        }

        distribute(&mut charges, target, precision);
        for (atom, charge) in self.iter_mut().zip(charges) {
            atom.charge = charge;
        }
        debug!(net_charge = target, "Normalized charges.");
        Ok(self)
    }
}

/// Redistributes `charges` in place so that their values rounded to `precision`
/// decimals sum exactly to `target`. `charges` must not be empty.
fn distribute(charges: &mut [f64], target: f64, precision: usize) {
    let count = charges.len() as f64;
    let total: f64 = charges.iter().sum();
    let shift = (total - target) / count;
    let scale = 10f64.powi(precision as i32);

    let scaled: Vec<f64> = charges.iter().map(|q| (q - shift) * scale).collect();
    let mut units: Vec<i64> = scaled.iter().map(|s| s.round() as i64).collect();
    let assigned: i128 = units.iter().map(|&u| i128::from(u)).sum();
    let residual = i128::from((target * scale).round() as i64) - assigned;

    if residual != 0 {
        // Positive residue goes to the atoms rounded down the most, negative to those rounded up the most.
        let mut order: Vec<usize> = (0..charges.len()).collect();
        let error = |i: usize| scaled[i] - units[i] as f64;
        order.sort_by(|&a, &b| {
            let ordering = error(b).partial_cmp(&error(a)).unwrap_or(Ordering::Equal);
            if residual > 0 { ordering } else { ordering.reverse() }
        });
        let step = residual.signum();
        for k in 0..residual.unsigned_abs() {
            units[order[k as usize % order.len()]] += step as i64;
        }
    }

    for (charge, unit) in charges.iter_mut().zip(units) {
        *charge = unit as f64 / scale;
    }
}
