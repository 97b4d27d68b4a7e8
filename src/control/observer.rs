use log::debug;
use nalgebra::{SVector, Vector1, Vector2, Vector4};
use serde::{Deserialize, Serialize};

use super::filter::TrapezoidalIntegrator;
use super::{AttitudeController, Measurement, Reference};
use crate::dynamics::AttitudeState;
use crate::error::{Result, WhirlybirdError};
use crate::gains::{
    ControllerGains, FeedbackGains, GainConfiguration, ObserverModel, LATERAL_OUTPUTS,
    LATERAL_STATES, LONGITUDINAL_OUTPUTS, LONGITUDINAL_STATES,
};
use crate::mixer::ForceTorque;
use crate::params::PlantParameters;

/// Continuous-time Luenberger observer integrated with forward Euler sub-steps.
///
/// Each sample period is split into `substeps` steps of
///
/// x̂ += Ts/N ⋅ (A (x̂ − x₀) + B (u − u₀) + L (y − C x̂))
///
/// with the input `u` held at its previous value.
#[derive(Clone, Debug)]
pub struct LuenbergerObserver<const N: usize, const P: usize> {
    model: ObserverModel<N, P>,
    x0: SVector<f64, N>,
    u0: f64,
    estimate: SVector<f64, N>,
    substep: f64,
    substeps: usize,
}

impl<const N: usize, const P: usize> LuenbergerObserver<N, P> {
    /// # Arguments
    ///
    /// * `model` - Linearized A, B, C and observer gain L
    /// * `x0`, `u0` - Linearization point
    /// * `initial` - Starting estimate
    /// * `ts` - Sample period (s)
    /// * `substeps` - Euler steps per sample period, at least one
    pub fn new(
        model: ObserverModel<N, P>,
        x0: SVector<f64, N>,
        u0: f64,
        initial: SVector<f64, N>,
        ts: f64,
        substeps: usize,
    ) -> Self {
        let substeps = substeps.max(1);
        Self {
            model,
            x0,
            u0,
            estimate: initial,
            substep: ts / substeps as f64,
            substeps,
        }
    }

    /// Advances the estimate by one sample period.
    ///
    /// # Arguments
    ///
    /// * `y` - Measured outputs, in the row order of C
    /// * `u_prev` - Input applied over the last period
    pub fn update(&mut self, y: &SVector<f64, P>, u_prev: f64) -> &SVector<f64, N> {
        let m = &self.model;
        let input = m.b * (u_prev - self.u0);

        for _ in 0..self.substeps {
            let innovation = y - m.c * self.estimate;
            let dx = m.a * (self.estimate - self.x0) + input + m.l * innovation;
            self.estimate += dx * self.substep;
        }

        &self.estimate
    }

    pub fn estimate(&self) -> &SVector<f64, N> {
        &self.estimate
    }
}

fn default_substeps() -> usize {
    10
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Forward Euler steps per sample period.
    #[serde(default = "default_substeps")]
    pub substeps: usize,
    pub gains: GainConfiguration,
}

impl ObserverConfig {
    pub fn validate(&self) -> Result<ControllerGains> {
        if self.substeps == 0 {
            return Err(WhirlybirdError::invalid(
                "controller.substeps",
                "must be at least 1",
            ));
        }
        let gains = self.gains.build()?;
        gains.lateral.require_observer("controller.gains.lateral")?;
        gains.longitudinal.require_observer("controller.gains.longitudinal")?;
        Ok(gains)
    }
}

/// Current observer estimates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObserverEstimates {
    /// `[φ̂, ψ̂, φ̂̇, ψ̂̇]`
    pub lateral: Vector4<f64>,
    /// `[θ̂, θ̂̇]`
    pub longitudinal: Vector2<f64>,
}

/// State feedback on observer estimates.
///
/// Only the angles are used: the lateral observer is fed `[ψ, φ]`, the longitudinal one
/// `[θ]`, and both are driven by the force and torque this controller commanded on the
/// previous tick. The tracking-error integrals use the estimated yaw and pitch.
pub struct ObserverStateFeedbackController {
    lateral_observer: LuenbergerObserver<LATERAL_STATES, LATERAL_OUTPUTS>,
    longitudinal_observer: LuenbergerObserver<LONGITUDINAL_STATES, LONGITUDINAL_OUTPUTS>,
    lateral: FeedbackGains<LATERAL_STATES>,
    longitudinal: FeedbackGains<LONGITUDINAL_STATES>,
    yaw_integrator: TrapezoidalIntegrator,
    pitch_integrator: TrapezoidalIntegrator,
    previous: ForceTorque,
}

impl ObserverStateFeedbackController {
    pub fn new(config: &ObserverConfig, params: &PlantParameters, initial: &AttitudeState) -> Result<Self> {
        let gains = config.validate()?;
        let lat = gains.lateral;
        let lon = gains.longitudinal;
        let ts = params.sample_period;

        let lat_model = *lat.require_observer("controller.gains.lateral")?;
        let lon_model = *lon.require_observer("controller.gains.longitudinal")?;

        debug!(
            "observer state feedback: {} substeps, L_lat = {:?}, L_lon = {:?}",
            config.substeps,
            lat_model.l.as_slice(),
            lon_model.l.as_slice()
        );

        let lateral_observer = LuenbergerObserver::new(
            lat_model,
            lat.feedback.x0,
            lat.feedback.u0,
            Vector4::new(initial.roll, initial.yaw, 0.0, 0.0),
            ts,
            config.substeps,
        );
        let longitudinal_observer = LuenbergerObserver::new(
            lon_model,
            lon.feedback.x0,
            lon.feedback.u0,
            Vector2::new(initial.pitch, 0.0),
            ts,
            config.substeps,
        );

        Ok(Self {
            lateral_observer,
            longitudinal_observer,
            lateral: lat.feedback,
            longitudinal: lon.feedback,
            yaw_integrator: TrapezoidalIntegrator::new(ts),
            pitch_integrator: TrapezoidalIntegrator::new(ts),
            previous: ForceTorque::new(lon.feedback.u0, lat.feedback.u0),
        })
    }

    pub fn estimates(&self) -> ObserverEstimates {
        ObserverEstimates {
            lateral: *self.lateral_observer.estimate(),
            longitudinal: *self.longitudinal_observer.estimate(),
        }
    }
}

impl AttitudeController for ObserverStateFeedbackController {
    fn update(&mut self, reference: &Reference, measurement: &Measurement, _saturated: bool) -> ForceTorque {
        let x_lon = *self
            .longitudinal_observer
            .update(&Vector1::new(measurement.pitch), self.previous.force);
        let x_lat = *self.lateral_observer.update(
            &Vector2::new(measurement.yaw, measurement.roll),
            self.previous.torque,
        );

        let yaw_integral = self.yaw_integrator.update(reference.yaw - x_lat[1], true);
        let pitch_integral = self
            .pitch_integrator
            .update(reference.pitch - x_lon[0], true);

        let output = ForceTorque::new(
            self.longitudinal.command(&x_lon, pitch_integral),
            self.lateral.command(&x_lat, yaw_integral),
        );
        self.previous = output;
        output
    }
}
