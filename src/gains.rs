//! Offline-designed gains and linearized models, as loaded from configuration.
//!
//! The pole placement happens elsewhere; this module only checks that the numbers have the
//! right shapes and turns them into fixed-size nalgebra types.

use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WhirlybirdError};

/// Number of lateral states: φ, ψ, φ̇, ψ̇.
pub const LATERAL_STATES: usize = 4;
/// Lateral outputs seen by the observer: ψ, φ.
pub const LATERAL_OUTPUTS: usize = 2;
/// Number of longitudinal states: θ, θ̇.
pub const LONGITUDINAL_STATES: usize = 2;
/// Longitudinal output: θ.
pub const LONGITUDINAL_OUTPUTS: usize = 1;

/// Gains of one subsystem as written in a configuration file.
///
/// Vectors are flat arrays; matrices are arrays of rows so ragged input can be reported.
/// The model matrices `a`, `b`, `c` and the observer gain `l` are only required by the
/// observer-based controller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsystemConfig {
    /// State feedback row K.
    pub k: Vec<f64>,
    /// Gain on the integral of the tracking error.
    pub ki: f64,
    /// Linearization point x₀; zeros when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equilibrium_state: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l: Option<Vec<Vec<f64>>>,
}

/// The full gain bundle for the state-feedback controllers.
///
/// # Fields
///
/// * `force_equilibrium` - Trim force F₀ the longitudinal law regulates around (N)
/// * `torque_equilibrium` - Trim torque τ₀ the lateral law regulates around (N⋅m)
/// * `lateral` - Roll/yaw subsystem, state `[φ, ψ, φ̇, ψ̇]`, input τ
/// * `longitudinal` - Pitch subsystem, state `[θ, θ̇]`, input F
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GainConfiguration {
    pub force_equilibrium: f64,
    #[serde(default)]
    pub torque_equilibrium: f64,
    pub lateral: SubsystemConfig,
    pub longitudinal: SubsystemConfig,
}

/// Integral-augmented state feedback for one single-input subsystem.
///
/// u = u₀ − K (x − x₀) − kᵢ ∫e
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeedbackGains<const N: usize> {
    pub k: SVector<f64, N>,
    pub ki: f64,
    pub x0: SVector<f64, N>,
    pub u0: f64,
}

impl<const N: usize> FeedbackGains<N> {
    pub fn command(&self, state: &SVector<f64, N>, integral: f64) -> f64 {
        self.u0 - self.k.dot(&(state - self.x0)) - self.ki * integral
    }
}

/// Linearized subsystem ẋ = A (x − x₀) + B (u − u₀), y = C x, with observer gain L.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObserverModel<const N: usize, const P: usize> {
    pub a: SMatrix<f64, N, N>,
    pub b: SVector<f64, N>,
    pub c: SMatrix<f64, P, N>,
    pub l: SMatrix<f64, N, P>,
}

/// Typed gains of one subsystem.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubsystemGains<const N: usize, const P: usize> {
    pub feedback: FeedbackGains<N>,
    pub observer: Option<ObserverModel<N, P>>,
}

impl<const N: usize, const P: usize> SubsystemGains<N, P> {
    /// The observer model, or an error naming the missing matrix.
    pub fn require_observer(&self, name: &str) -> Result<&ObserverModel<N, P>> {
        self.observer.as_ref().ok_or_else(|| {
            WhirlybirdError::invalid(name, "observer-based control needs a, b, c and l")
        })
    }
}

/// Validated gains for both subsystems.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControllerGains {
    pub lateral: SubsystemGains<LATERAL_STATES, LATERAL_OUTPUTS>,
    pub longitudinal: SubsystemGains<LONGITUDINAL_STATES, LONGITUDINAL_OUTPUTS>,
}

fn shape(rows: usize, cols: usize) -> String {
    format!("{rows}x{cols}")
}

fn check_finite(name: &str, values: &[f64]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(WhirlybirdError::invalid(name, "contains a non-finite value"))
    }
}

fn vector<const N: usize>(name: &str, values: &[f64]) -> Result<SVector<f64, N>> {
    if values.len() != N {
        return Err(WhirlybirdError::DimensionMismatch {
            name: name.to_string(),
            expected: format!("length {N}"),
            actual: format!("length {}", values.len()),
        });
    }
    check_finite(name, values)?;
    Ok(SVector::from_column_slice(values))
}

fn matrix<const R: usize, const C: usize>(name: &str, rows: &[Vec<f64>]) -> Result<SMatrix<f64, R, C>> {
    let mismatch = |actual: String| WhirlybirdError::DimensionMismatch {
        name: name.to_string(),
        expected: shape(R, C),
        actual,
    };

    if rows.len() != R {
        let cols = rows.first().map_or(0, |r| r.len());
        return Err(mismatch(shape(rows.len(), cols)));
    }
    if let Some(bad) = rows.iter().find(|r| r.len() != C) {
        return Err(mismatch(format!("ragged (a row has {} entries)", bad.len())));
    }
    for row in rows {
        check_finite(name, row)?;
    }

    Ok(SMatrix::from_fn(|i, j| rows[i][j]))
}

impl SubsystemConfig {
    fn build<const N: usize, const P: usize>(&self, name: &str, u0: f64) -> Result<SubsystemGains<N, P>> {
        let field = |suffix: &str| format!("{name}.{suffix}");

        let k = vector::<N>(&field("k"), &self.k)?;
        if !self.ki.is_finite() {
            return Err(WhirlybirdError::invalid(field("ki"), "must be finite"));
        }
        let x0 = match &self.equilibrium_state {
            Some(x0) => vector::<N>(&field("equilibrium_state"), x0)?,
            None => SVector::zeros(),
        };

        let observer = match (&self.a, &self.b, &self.c, &self.l) {
            (None, None, None, None) => None,
            (Some(a), Some(b), Some(c), Some(l)) => Some(ObserverModel {
                a: matrix::<N, N>(&field("a"), a)?,
                b: vector::<N>(&field("b"), b)?,
                c: matrix::<P, N>(&field("c"), c)?,
                l: matrix::<N, P>(&field("l"), l)?,
            }),
            _ => {
                return Err(WhirlybirdError::invalid(
                    name,
                    "a, b, c and l must be given together",
                ))
            }
        };

        Ok(SubsystemGains {
            feedback: FeedbackGains {
                k,
                ki: self.ki,
                x0,
                u0,
            },
            observer,
        })
    }
}

impl GainConfiguration {
    /// Checks every vector and matrix against its subsystem's dimensions.
    ///
    /// # Returns
    ///
    /// * `Ok(ControllerGains)` - Fixed-size gains ready for the controllers
    /// * `Err(WhirlybirdError::DimensionMismatch)` - Wrong length, wrong shape or ragged rows
    /// * `Err(WhirlybirdError::InvalidConfig)` - Non-finite entries or an incomplete model
    pub fn build(&self) -> Result<ControllerGains> {
        if !(self.force_equilibrium.is_finite() && self.torque_equilibrium.is_finite()) {
            return Err(WhirlybirdError::invalid(
                "controller.gains",
                "equilibrium force and torque must be finite",
            ));
        }

        Ok(ControllerGains {
            lateral: self
                .lateral
                .build("controller.gains.lateral", self.torque_equilibrium)?,
            longitudinal: self
                .longitudinal
                .build("controller.gains.longitudinal", self.force_equilibrium)?,
        })
    }
}
