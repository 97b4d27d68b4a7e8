use log::debug;
use nalgebra::{Vector2, Vector4};
use serde::{Deserialize, Serialize};

use super::filter::{DirtyDerivative, TrapezoidalIntegrator};
use super::{AttitudeController, Measurement, Reference};
use crate::dynamics::AttitudeState;
use crate::error::{Result, WhirlybirdError};
use crate::gains::{ControllerGains, FeedbackGains, GainConfiguration};
use crate::mixer::ForceTorque;
use crate::params::PlantParameters;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateFeedbackConfig {
    /// Time constant of the rate estimators used when rates are not measured (s).
    pub sigma: f64,
    pub gains: GainConfiguration,
}

impl StateFeedbackConfig {
    pub fn validate(&self) -> Result<ControllerGains> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(WhirlybirdError::invalid(
                "controller.sigma",
                format!("must be finite and > 0, got {}", self.sigma),
            ));
        }
        self.gains.build()
    }
}

/// Integral-augmented state feedback on the decoupled lateral and longitudinal subsystems.
///
/// Lateral state `[φ, ψ, φ̇, ψ̇]` drives the torque and integrates the yaw error;
/// longitudinal state `[θ, θ̇]` drives the force and integrates the pitch error. Rates come
/// from the measurement when it carries them, otherwise from dirty derivatives of the
/// angles. There is no anti-windup: the saturation flag is ignored.
pub struct StateFeedbackController {
    lateral: FeedbackGains<4>,
    longitudinal: FeedbackGains<2>,
    roll_rate: DirtyDerivative,
    pitch_rate: DirtyDerivative,
    yaw_rate: DirtyDerivative,
    yaw_integrator: TrapezoidalIntegrator,
    pitch_integrator: TrapezoidalIntegrator,
}

impl StateFeedbackController {
    pub fn new(
        config: &StateFeedbackConfig,
        params: &PlantParameters,
        initial: &AttitudeState,
    ) -> Result<Self> {
        let gains = config.validate()?;
        let ts = params.sample_period;
        let rate = |start: f64| DirtyDerivative::new(config.sigma, ts, start);

        debug!(
            "state feedback: K_lat = {:?}, ki_lat = {}, K_lon = {:?}, ki_lon = {}",
            gains.lateral.feedback.k.as_slice(),
            gains.lateral.feedback.ki,
            gains.longitudinal.feedback.k.as_slice(),
            gains.longitudinal.feedback.ki
        );

        Ok(Self {
            lateral: gains.lateral.feedback,
            longitudinal: gains.longitudinal.feedback,
            roll_rate: rate(initial.roll),
            pitch_rate: rate(initial.pitch),
            yaw_rate: rate(initial.yaw),
            yaw_integrator: TrapezoidalIntegrator::new(ts),
            pitch_integrator: TrapezoidalIntegrator::new(ts),
        })
    }

    /// Current integrals of the yaw and pitch tracking errors.
    pub fn integrals(&self) -> (f64, f64) {
        (self.yaw_integrator.value(), self.pitch_integrator.value())
    }
}

impl AttitudeController for StateFeedbackController {
    fn update(&mut self, reference: &Reference, measurement: &Measurement, _saturated: bool) -> ForceTorque {
        // The filters always see the angles so their delayed samples stay current
        let estimated = [
            self.roll_rate.update(measurement.roll),
            self.pitch_rate.update(measurement.pitch),
            self.yaw_rate.update(measurement.yaw),
        ];
        let [roll_rate, pitch_rate, yaw_rate] = match measurement.rates {
            Some(rates) => [rates[0], rates[1], rates[2]],
            None => estimated,
        };

        let yaw_integral = self
            .yaw_integrator
            .update(reference.yaw - measurement.yaw, true);
        let pitch_integral = self
            .pitch_integrator
            .update(reference.pitch - measurement.pitch, true);

        let x_lat = Vector4::new(measurement.roll, measurement.yaw, roll_rate, yaw_rate);
        let x_lon = Vector2::new(measurement.pitch, pitch_rate);

        ForceTorque::new(
            self.longitudinal.command(&x_lon, pitch_integral),
            self.lateral.command(&x_lat, yaw_integral),
        )
    }
}
