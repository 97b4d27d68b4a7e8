use log::debug;
use serde::{Deserialize, Serialize};

use super::filter::{DirtyDerivative, TrapezoidalIntegrator};
use super::{AttitudeController, Measurement, Reference};
use crate::dynamics::AttitudeState;
use crate::error::{Result, WhirlybirdError};
use crate::mixer::ForceTorque;
use crate::params::PlantParameters;

/// Gains of a single PID loop.
///
/// # Fields
///
/// * `kp` - Proportional gain
/// * `kd` - Derivative gain, applied to the measurement rate (no derivative kick)
/// * `ki` - Integral gain; zero turns the loop into plain PD
/// * `limit` - Optional symmetric clamp on the loop output
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisGains {
    pub kp: f64,
    pub kd: f64,
    #[serde(default)]
    pub ki: f64,
    #[serde(default)]
    pub limit: Option<f64>,
}

/// Where the derivative term gets the rate from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivativeSource {
    /// Dirty derivative of the measured angle.
    #[default]
    Filtered,
    /// Rate carried by the measurement, falling back to the filtered value.
    Measured,
}

fn default_windup_rate() -> f64 {
    0.05
}

/// Successive-loop PD configuration.
///
/// Pitch is always controlled. Yaw and roll form a cascade: the yaw loop commands a roll
/// angle that the roll loop tracks with torque. A yaw loop without a roll loop has nothing
/// to drive and is rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PdConfig {
    /// Derivative filter time constant σ (s).
    pub sigma: f64,
    /// Integration is suspended while the derivative magnitude exceeds this (rad/s).
    #[serde(default = "default_windup_rate")]
    pub windup_rate_threshold: f64,
    #[serde(default)]
    pub derivative: DerivativeSource,
    pub pitch: AxisGains,
    #[serde(default)]
    pub yaw: Option<AxisGains>,
    #[serde(default)]
    pub roll: Option<AxisGains>,
}

impl PdConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(WhirlybirdError::invalid(
                "controller.sigma",
                format!("must be finite and > 0, got {}", self.sigma),
            ));
        }
        if !(self.windup_rate_threshold >= 0.0) {
            return Err(WhirlybirdError::invalid(
                "controller.windup_rate_threshold",
                "must be >= 0",
            ));
        }
        if self.yaw.is_some() && self.roll.is_none() {
            return Err(WhirlybirdError::invalid(
                "controller.yaw",
                "yaw loop commands roll and needs a roll loop",
            ));
        }

        let axes = [
            ("controller.pitch", Some(&self.pitch)),
            ("controller.yaw", self.yaw.as_ref()),
            ("controller.roll", self.roll.as_ref()),
        ];
        for (field, gains) in axes {
            let Some(gains) = gains else { continue };
            if ![gains.kp, gains.kd, gains.ki].iter().all(|g| g.is_finite()) {
                return Err(WhirlybirdError::invalid(field, "gains must be finite"));
            }
            if let Some(limit) = gains.limit {
                if !(limit > 0.0) {
                    return Err(WhirlybirdError::invalid(field, "limit must be > 0"));
                }
            }
        }
        Ok(())
    }
}

/// One PID loop with filtered derivative and conditional integration.
#[derive(Clone, Debug)]
pub struct AxisPd {
    gains: AxisGains,
    windup_rate_threshold: f64,
    differentiator: DirtyDerivative,
    integrator: TrapezoidalIntegrator,
}

impl AxisPd {
    pub fn new(gains: AxisGains, sigma: f64, ts: f64, windup_rate_threshold: f64, initial: f64) -> Self {
        Self {
            gains,
            windup_rate_threshold,
            differentiator: DirtyDerivative::new(sigma, ts, initial),
            integrator: TrapezoidalIntegrator::new(ts),
        }
    }

    /// Runs the loop for one sample.
    ///
    /// # Arguments
    ///
    /// * `reference` - Commanded value
    /// * `measurement` - Measured value
    /// * `measured_rate` - Rate to use in place of the filtered derivative, if any
    /// * `saturated` - Whether the mixer saturated on the previous tick
    ///
    /// # Returns
    ///
    /// kp e − kd ẏ + ki ∫e, clamped to the axis limit if one is set.
    ///
    /// # Anti-windup
    ///
    /// The integral is frozen while |ẏ| exceeds the windup threshold or the actuators were
    /// saturated on the previous tick.
    pub fn update(
        &mut self,
        reference: f64,
        measurement: f64,
        measured_rate: Option<f64>,
        saturated: bool,
    ) -> f64 {
        let error = reference - measurement;

        let filtered = self.differentiator.update(measurement);
        let rate = measured_rate.unwrap_or(filtered);

        let accumulate = rate.abs() < self.windup_rate_threshold && !saturated;
        let integral = self.integrator.update(error, accumulate);

        let output = self.gains.kp * error - self.gains.kd * rate + self.gains.ki * integral;

        match self.gains.limit {
            Some(limit) => output.clamp(-limit, limit),
            None => output,
        }
    }

    pub fn integrator(&self) -> f64 {
        self.integrator.value()
    }

    pub fn derivative(&self) -> f64 {
        self.differentiator.value()
    }
}

/// Successive-loop PD controller for pitch, yaw and roll.
///
/// # Control Architecture
///
/// Pitch reference → Pitch loop → ΔF, added to the gravity trim F_e(θ)
///
/// Yaw reference → Yaw loop → Roll reference → Roll loop → τ
pub struct PdController {
    params: PlantParameters,
    derivative: DerivativeSource,
    pitch: AxisPd,
    yaw: Option<AxisPd>,
    roll: Option<AxisPd>,
}

impl PdController {
    /// Builds the per-axis loops with their delayed measurements at the initial attitude.
    pub fn new(config: &PdConfig, params: &PlantParameters, initial: &AttitudeState) -> Result<Self> {
        config.validate()?;
        let ts = params.sample_period;
        let axis = |gains: AxisGains, start: f64| {
            AxisPd::new(gains, config.sigma, ts, config.windup_rate_threshold, start)
        };

        debug!(
            "PD controller: pitch {:?}, yaw {:?}, roll {:?}",
            config.pitch, config.yaw, config.roll
        );

        Ok(Self {
            params: *params,
            derivative: config.derivative,
            pitch: axis(config.pitch, initial.pitch),
            yaw: config.yaw.map(|g| axis(g, initial.yaw)),
            roll: config.roll.map(|g| axis(g, initial.roll)),
        })
    }

    pub fn pitch_axis(&self) -> &AxisPd {
        &self.pitch
    }

    pub fn yaw_axis(&self) -> Option<&AxisPd> {
        self.yaw.as_ref()
    }

    pub fn roll_axis(&self) -> Option<&AxisPd> {
        self.roll.as_ref()
    }

    fn rate(&self, measurement: &Measurement, index: usize) -> Option<f64> {
        match self.derivative {
            DerivativeSource::Filtered => None,
            DerivativeSource::Measured => measurement.rates.map(|r| r[index]),
        }
    }
}

impl AttitudeController for PdController {
    fn update(&mut self, reference: &Reference, measurement: &Measurement, saturated: bool) -> ForceTorque {
        let roll_rate = self.rate(measurement, 0);
        let pitch_rate = self.rate(measurement, 1);
        let yaw_rate = self.rate(measurement, 2);

        let roll_reference = match self.yaw.as_mut() {
            Some(yaw) => yaw.update(reference.yaw, measurement.yaw, yaw_rate, saturated),
            None => 0.0,
        };

        let force = self.params.equilibrium_force(measurement.pitch)
            + self
                .pitch
                .update(reference.pitch, measurement.pitch, pitch_rate, saturated);

        let torque = match self.roll.as_mut() {
            Some(roll) => roll.update(roll_reference, measurement.roll, roll_rate, saturated),
            None => 0.0,
        };

        ForceTorque::new(force, torque)
    }
}
