//! Attitude control laws.
//!
//! Three interchangeable strategies share one tick interface, [`AttitudeController`]:
//!
//! * [`pd::PdController`] - successive-loop PD with filtered derivative and anti-windup
//! * [`state_feedback::StateFeedbackController`] - integral-augmented state feedback
//! * [`observer::ObserverStateFeedbackController`] - the same law on Luenberger estimates
//!
//! Exactly one of them runs per rig, chosen by [`ControllerConfig`].

pub mod filter;
pub mod observer;
pub mod pd;
pub mod state_feedback;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::dynamics::AttitudeState;
use crate::error::Result;
use crate::mixer::ForceTorque;
use crate::params::PlantParameters;

pub use observer::{ObserverConfig, ObserverStateFeedbackController};
pub use pd::{PdConfig, PdController};
pub use state_feedback::{StateFeedbackConfig, StateFeedbackController};

/// Commanded attitude (rad). Roll is never commanded directly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub pitch: f64,
    pub yaw: f64,
}

/// Sensed attitude for one tick.
///
/// # Fields
///
/// * `roll`, `pitch`, `yaw` - Measured angles (rad)
/// * `rates` - `(φ̇, θ̇, ψ̇)` when the sensor provides them
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Measurement {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub rates: Option<Vector3<f64>>,
}

impl Measurement {
    pub fn angles(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            roll,
            pitch,
            yaw,
            rates: None,
        }
    }

    pub fn with_rates(mut self, rates: Vector3<f64>) -> Self {
        self.rates = Some(rates);
        self
    }

    /// Reads the angles, and the rates if `include_rates` is set, off a full state.
    pub fn from_state(state: &AttitudeState, include_rates: bool) -> Self {
        let angles = Self::angles(state.roll, state.pitch, state.yaw);
        if include_rates {
            angles.with_rates(state.rates())
        } else {
            angles
        }
    }
}

/// A discrete-time attitude control law, called exactly once per sample period.
pub trait AttitudeController {
    /// Computes the force/torque command for this tick.
    ///
    /// # Arguments
    ///
    /// * `reference` - Commanded pitch and yaw
    /// * `measurement` - Sensed attitude
    /// * `saturated` - Whether the mixer saturated on the previous tick
    fn update(&mut self, reference: &Reference, measurement: &Measurement, saturated: bool) -> ForceTorque;
}

/// Controller selection and gains.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerConfig {
    Pd(PdConfig),
    StateFeedback(StateFeedbackConfig),
    ObserverStateFeedback(ObserverConfig),
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            ControllerConfig::Pd(config) => config.validate(),
            ControllerConfig::StateFeedback(config) => config.validate().map(|_| ()),
            ControllerConfig::ObserverStateFeedback(config) => config.validate().map(|_| ()),
        }
    }
}

/// The controller chosen for this run.
pub enum ControlStrategy {
    Pd(PdController),
    StateFeedback(StateFeedbackController),
    ObserverStateFeedback(ObserverStateFeedbackController),
}

impl ControlStrategy {
    /// Builds the configured controller with its memory primed from `initial`.
    pub fn from_config(
        config: &ControllerConfig,
        params: &PlantParameters,
        initial: &AttitudeState,
    ) -> Result<Self> {
        Ok(match config {
            ControllerConfig::Pd(c) => ControlStrategy::Pd(PdController::new(c, params, initial)?),
            ControllerConfig::StateFeedback(c) => {
                ControlStrategy::StateFeedback(StateFeedbackController::new(c, params, initial)?)
            }
            ControllerConfig::ObserverStateFeedback(c) => ControlStrategy::ObserverStateFeedback(
                ObserverStateFeedbackController::new(c, params, initial)?,
            ),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlStrategy::Pd(_) => "pd",
            ControlStrategy::StateFeedback(_) => "state_feedback",
            ControlStrategy::ObserverStateFeedback(_) => "observer_state_feedback",
        }
    }
}

impl AttitudeController for ControlStrategy {
    fn update(&mut self, reference: &Reference, measurement: &Measurement, saturated: bool) -> ForceTorque {
        match self {
            ControlStrategy::Pd(c) => c.update(reference, measurement, saturated),
            ControlStrategy::StateFeedback(c) => c.update(reference, measurement, saturated),
            ControlStrategy::ObserverStateFeedback(c) => c.update(reference, measurement, saturated),
        }
    }
}
