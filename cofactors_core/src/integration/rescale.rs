//! Michaelis-Menten correction of fluxes for a change in cofactor concentration
use thiserror::Error;

use crate::metabolic_model::reaction::ReactionBounds;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RescaleError {
    #[error("Division by zero rescaling with Km {km}, old concentration {c_old} and new concentration {c_new}")]
    DivisionByZero { km: f64, c_old: f64, c_new: f64 },
    #[error("Cannot rescale flux {flux} with Km {km}, old concentration {c_old} and new concentration {c_new}")]
    NonFinite {
        flux: f64,
        km: f64,
        c_old: f64,
        c_new: f64,
    },
}

/// Flux expected at concentration `c_new`, given `flux` at concentration `c_old`
///
/// `flux * (c_new / (km + c_new)) * ((km + c_old) / c_old)`
///
/// Infinite fluxes stay infinite, any other non-finite input or result is an error.
pub fn rescale(flux: f64, km: f64, c_old: f64, c_new: f64) -> Result<f64, RescaleError> {
    if c_old == 0. || km + c_new == 0. {
        return Err(RescaleError::DivisionByZero { km, c_old, c_new });
    }
    let non_finite = RescaleError::NonFinite {
        flux,
        km,
        c_old,
        c_new,
    };
    if flux.is_nan() || !km.is_finite() || !c_old.is_finite() || !c_new.is_finite() {
        return Err(non_finite);
    }
    let rescaled = flux * (c_new / (km + c_new)) * ((km + c_old) / c_old);
    if rescaled.is_nan() {
        return Err(non_finite);
    }
    Ok(rescaled)
}

/// Rescale both ends of a flux range, the result always includes zero
pub fn rescale_range(
    low: f64,
    high: f64,
    km: f64,
    c_old: f64,
    c_new: f64,
) -> Result<ReactionBounds, RescaleError> {
    Ok(ReactionBounds::straddling_zero(
        rescale(low, km, c_old, c_new)?,
        rescale(high, km, c_old, c_new)?,
    ))
}

/// Rescale a single flux into bounds between zero and the rescaled flux
pub fn rescale_point(flux: f64, km: f64, c_old: f64, c_new: f64) -> Result<ReactionBounds, RescaleError> {
    let goal = rescale(flux, km, c_old, c_new)?;
    Ok(ReactionBounds::straddling_zero(goal, goal))
}
