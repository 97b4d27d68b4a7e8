use fast_ode;
use log::error;
use nalgebra::{Matrix3, Vector3, Vector6};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WhirlybirdError};
use crate::params::PlantParameters;

/// Attitude of the whirlybird boom and its rates.
///
/// # Fields
///
/// * `roll`, `pitch`, `yaw` - Gimbal angles φ, θ, ψ (radians, no wraparound)
/// * `roll_rate`, `pitch_rate`, `yaw_rate` - Their time derivatives (rad/s)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttitudeState {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub roll_rate: f64,
    pub pitch_rate: f64,
    pub yaw_rate: f64,
}

impl AttitudeState {
    /// Converts the state to `[φ, θ, ψ, φ̇, θ̇, ψ̇]`.
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.roll,
            self.pitch,
            self.yaw,
            self.roll_rate,
            self.pitch_rate,
            self.yaw_rate,
        ]
    }

    /// Creates a state from an array in the same order as `to_array()`.
    pub fn from_array(arr: &[f64; 6]) -> Self {
        AttitudeState {
            roll: arr[0],
            pitch: arr[1],
            yaw: arr[2],
            roll_rate: arr[3],
            pitch_rate: arr[4],
            yaw_rate: arr[5],
        }
    }

    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::from(self.to_array())
    }

    pub fn from_vector(v: &Vector6<f64>) -> Self {
        AttitudeState::from_array(&[v[0], v[1], v[2], v[3], v[4], v[5]])
    }

    /// The sensed part of the state, `(φ, θ, ψ)`.
    pub fn angles(&self) -> Vector3<f64> {
        Vector3::new(self.roll, self.pitch, self.yaw)
    }

    pub fn rates(&self) -> Vector3<f64> {
        Vector3::new(self.roll_rate, self.pitch_rate, self.yaw_rate)
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Thrust produced by the left and right rotors (N).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RotorThrust {
    pub left: f64,
    pub right: f64,
}

impl RotorThrust {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// Equal thrust on both rotors summing to `force`.
    pub fn balanced(force: f64) -> Self {
        Self::new(force / 2.0, force / 2.0)
    }
}

/// Equations of motion of the whirlybird under constant rotor thrust.
///
/// The boom is modelled as a rigid body on a three-axis gimbal. Lagrange's equations give
///
/// M(φ, θ) q̈ + c(q, q̇) + ∂P/∂q = Q(φ, θ, f_l, f_r)
///
/// with q = (φ, θ, ψ). The rotor thrust is held constant over one integration span.
///
/// # Fields
///
/// * `params` - Physical constants of the rig
/// * `thrust` - Left/right rotor thrust applied over the span (N)
pub struct WhirlybirdOde {
    pub params: PlantParameters,
    pub thrust: RotorThrust,
}

impl WhirlybirdOde {
    /// Generalized inertia matrix M(φ, θ).
    pub fn inertia_matrix(&self, phi: f64, theta: f64) -> Matrix3<f64> {
        let p = &self.params;
        let (sp, cp) = phi.sin_cos();
        let (st, ct) = theta.sin_cos();
        let boom = p.boom_inertia();
        let cross = (p.jy - p.jz) * sp * cp * ct;

        Matrix3::new(
            p.jx,
            0.0,
            -p.jx * st,
            0.0,
            boom + p.jy * cp * cp + p.jz * sp * sp,
            cross,
            -p.jx * st,
            cross,
            (boom + p.jy * sp * sp + p.jz * cp * cp) * ct * ct + p.jx * st * st,
        )
    }

    /// Coriolis and centripetal terms c(q, q̇).
    pub fn coriolis(&self, state: &Vector6<f64>) -> Vector3<f64> {
        let p = &self.params;
        let (sp, cp) = state[0].sin_cos();
        let (st, ct) = state[1].sin_cos();
        let phidot = state[3];
        let thetadot = state[4];
        let psidot = state[5];

        let jzy = p.jz - p.jy;
        let spcp = sp * cp;
        let c2p = cp * cp - sp * sp;
        // Pitch-axis inertia seen by yaw, without the ct² factor
        let e = p.boom_inertia() + p.jy * sp * sp + p.jz * cp * cp;

        Vector3::new(
            -thetadot * thetadot * jzy * spcp + psidot * psidot * jzy * spcp * ct * ct
                - thetadot * psidot * ct * (p.jx - jzy * c2p),
            psidot * psidot * st * ct * (e - p.jx) + 2.0 * phidot * thetadot * jzy * spcp
                - phidot * psidot * ct * (-p.jx + jzy * c2p),
            thetadot * thetadot * jzy * spcp * st
                - phidot * thetadot * ct * (p.jx + jzy * c2p)
                - 2.0 * phidot * psidot * jzy * ct * ct * spcp
                + 2.0 * thetadot * psidot * st * ct * (p.jx - e),
        )
    }

    /// Gravity term ∂P/∂q; only pitch is restored by gravity.
    pub fn gravity(&self, theta: f64) -> Vector3<f64> {
        Vector3::new(0.0, self.params.gravity_moment() * theta.cos(), 0.0)
    }

    /// Generalized forces produced by the rotors.
    pub fn generalized_force(&self, phi: f64, theta: f64) -> Vector3<f64> {
        let p = &self.params;
        let fl = self.thrust.left;
        let fr = self.thrust.right;
        let (sp, cp) = phi.sin_cos();
        let (st, ct) = theta.sin_cos();

        Vector3::new(
            p.d * (fl - fr),
            p.l1 * (fl + fr) * cp,
            p.l1 * (fl + fr) * ct * sp + p.d * (fr - fl) * st,
        )
    }

    /// Computes the time derivative of the state vector.
    ///
    /// Solves M q̈ = Q − c − ∂P/∂q for the angular accelerations.
    ///
    /// # Arguments
    ///
    /// * `state` - `[φ, θ, ψ, φ̇, θ̇, ψ̇]`
    ///
    /// # Returns
    ///
    /// * `Ok([φ̇, θ̇, ψ̇, φ̈, θ̈, ψ̈])`
    /// * `Err(WhirlybirdError::SingularInertia)` if M cannot be inverted at this attitude
    pub fn derivatives(&self, state: &Vector6<f64>) -> Result<Vector6<f64>> {
        let phi = state[0];
        let theta = state[1];

        let m = self.inertia_matrix(phi, theta);
        let singular = || WhirlybirdError::SingularInertia { roll: phi, pitch: theta };

        // Relative test: try_inverse only rejects an exactly zero determinant
        let scale = m.norm().powi(3);
        if !(m.determinant().abs() > 1e-12 * scale) {
            return Err(singular());
        }
        let m_inv = m.try_inverse().ok_or_else(singular)?;

        let rhs = self.generalized_force(phi, theta) - self.coriolis(state) - self.gravity(theta);
        let accel = m_inv * rhs;
        if !accel.iter().all(|a| a.is_finite()) {
            return Err(singular());
        }

        Ok(Vector6::new(
            state[3], state[4], state[5], accel[0], accel[1], accel[2],
        ))
    }

    /// Kinetic plus potential energy, ½ q̇ᵀ M q̇ + (m1 l1 − m2 l2) g sin θ.
    pub fn energy(&self, state: &Vector6<f64>) -> f64 {
        let qdot = Vector3::new(state[3], state[4], state[5]);
        let m = self.inertia_matrix(state[0], state[1]);
        0.5 * qdot.dot(&(m * qdot)) + self.params.gravity_moment() * state[1].sin()
    }
}

impl fast_ode::DifferentialEquation<6> for WhirlybirdOde {
    /// Evaluates the equations of motion for the adaptive solver.
    ///
    /// The returned flag is `false` when the inertia matrix is singular at `y`, which
    /// tells the solver the point is outside the valid domain.
    fn ode_dot_y(&self, _t: f64, y: &fast_ode::Coord<6>) -> (fast_ode::Coord<6>, bool) {
        match self.derivatives(&Vector6::from(y.0)) {
            Ok(dot_y) => (fast_ode::Coord(dot_y.into()), true),
            Err(_) => (fast_ode::Coord([0.0; 6]), false),
        }
    }
}

/// One classical Runge-Kutta step of length `h`.
pub fn rk4_step(ode: &WhirlybirdOde, state: &Vector6<f64>, h: f64) -> Result<Vector6<f64>> {
    let k1 = ode.derivatives(state)?;
    let k2 = ode.derivatives(&(state + k1 * (h / 2.0)))?;
    let k3 = ode.derivatives(&(state + k2 * (h / 2.0)))?;
    let k4 = ode.derivatives(&(state + k3 * h))?;

    Ok(state + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0))
}

/// Owns the simulated rig state and advances it one sample period at a time.
pub struct DynamicsIntegrator {
    params: PlantParameters,
    state: AttitudeState,
}

impl DynamicsIntegrator {
    pub fn new(params: PlantParameters, initial_state: AttitudeState) -> Self {
        Self {
            params,
            state: initial_state,
        }
    }

    /// Advances the state by exactly one sample period under constant rotor thrust.
    ///
    /// Uses fixed-step RK4. On failure the state is left untouched.
    ///
    /// # Arguments
    ///
    /// * `thrust` - Left/right rotor thrust held over the period (N)
    ///
    /// # Returns
    ///
    /// * `Ok(())` - State advanced by `sample_period`
    /// * `Err(WhirlybirdError::SingularInertia)` - The configuration is degenerate
    pub fn propagate(&mut self, thrust: RotorThrust) -> Result<()> {
        let ode = WhirlybirdOde {
            params: self.params,
            thrust,
        };

        match rk4_step(&ode, &self.state.to_vector(), self.params.sample_period) {
            Ok(next) => {
                self.state = AttitudeState::from_vector(&next);
                Ok(())
            }
            Err(e) => {
                error!("dynamics propagation failed: {}", e);
                Err(e)
            }
        }
    }

    /// Sensed attitude `(φ, θ, ψ)`.
    pub fn outputs(&self) -> Vector3<f64> {
        self.state.angles()
    }

    pub fn full_state(&self) -> AttitudeState {
        self.state
    }

    pub fn params(&self) -> &PlantParameters {
        &self.params
    }
}

/// Integrates the whirlybird over a time interval with an adaptive step-size solver.
///
/// Serves as a reference for the fixed-step propagation and for offline tooling. The
/// rotor thrust is held constant over the whole span.
///
/// # Arguments
///
/// * `initial_state` - Attitude at `time_span.0`
/// * `params` - Physical constants of the rig
/// * `thrust` - Constant rotor thrust (N)
/// * `time_span` - `(t_start, t_end)` in seconds
/// * `tolerance` - Tolerance handed to the solver
///
/// # Returns
///
/// * `Ok(AttitudeState)` - State at `time_span.1`
/// * `Err(WhirlybirdError::Integration)` - The solver stopped early
pub fn simulate_span(
    initial_state: AttitudeState,
    params: PlantParameters,
    thrust: RotorThrust,
    time_span: (f64, f64),
    tolerance: f64,
) -> Result<AttitudeState> {
    let ode = WhirlybirdOde { params, thrust };

    let initial_coord = fast_ode::Coord(initial_state.to_array());

    let result = fast_ode::solve_ivp(
        &ode,
        time_span,
        initial_coord,
        |_, _| true,
        tolerance,
        tolerance * 10.0,
    );

    match result {
        fast_ode::IvpResult::FinalTimeReached(final_coord) => {
            Ok(AttitudeState::from_array(&final_coord.0))
        }
        _ => Err(WhirlybirdError::Integration(format!(
            "final time {} not reached",
            time_span.1
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn integrate(params: PlantParameters, initial: AttitudeState, thrust: RotorThrust, t: f64) -> AttitudeState {
        let steps = (t / params.sample_period).round() as usize;
        let mut plant = DynamicsIntegrator::new(params, initial);
        for _ in 0..steps {
            plant.propagate(thrust).unwrap();
        }
        plant.full_state()
    }

    /// A pitch deflection below the horizontal with matching trim thrust swings like a
    /// pendulum about the trim angle.
    fn pendulum_case() -> (AttitudeState, RotorThrust) {
        let params = PlantParameters::default();
        let trim = -0.3;
        let initial = AttitudeState {
            pitch: trim + 0.05,
            ..Default::default()
        };
        (initial, RotorThrust::balanced(params.equilibrium_force(trim)))
    }

    proptest! {
        /// Trim thrust at any level-roll attitude is a fixed point.
        #[test]
        fn test_trim_is_fixed_point(pitch in -1.2f64..1.2, yaw in -3.0f64..3.0) {
            let params = PlantParameters::default();
            let initial = AttitudeState { pitch, yaw, ..Default::default() };
            let thrust = RotorThrust::balanced(params.equilibrium_force(pitch));

            let state = integrate(params, initial, thrust, 0.5);

            for (a, b) in state.to_array().iter().zip(initial.to_array().iter()) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }

        /// A gravity-balanced boom at rest with the rotors off stays where it is.
        #[test]
        fn test_balanced_rest_is_fixed_point(
            roll in -1.0f64..1.0,
            pitch in -1.2f64..1.2,
            yaw in -3.0f64..3.0,
        ) {
            let mut params = PlantParameters::default();
            params.m2 = params.m1 * params.l1 / params.l2;
            let initial = AttitudeState { roll, pitch, yaw, ..Default::default() };

            let state = integrate(params, initial, RotorThrust::default(), 0.5);

            for (a, b) in state.to_array().iter().zip(initial.to_array().iter()) {
                prop_assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_energy_is_conserved_without_thrust() {
        let params = PlantParameters::default();
        let ode = WhirlybirdOde {
            params,
            thrust: RotorThrust::default(),
        };
        let initial = AttitudeState {
            roll: 0.3,
            pitch: 0.2,
            yaw: 0.0,
            roll_rate: 0.8,
            pitch_rate: -0.4,
            yaw_rate: 0.6,
        };
        let start = ode.energy(&initial.to_vector());

        let mut fine = params;
        fine.sample_period = 0.001;
        let state = integrate(fine, initial, RotorThrust::default(), 0.5);
        let end = ode.energy(&state.to_vector());

        assert!(
            (end - start).abs() < 1e-6 * start.abs().max(1.0),
            "energy drifted from {} to {}",
            start,
            end
        );
    }

    #[test]
    fn test_rk4_error_is_fourth_order() {
        let (initial, thrust) = pendulum_case();
        let horizon = 4.0;

        let with_step = |h: f64| {
            let mut params = PlantParameters::default();
            params.sample_period = h;
            integrate(params, initial, thrust, horizon).to_vector()
        };

        let reference = with_step(0.1 / 64.0);
        let coarse = (with_step(0.1) - reference).norm();
        let fine = (with_step(0.05) - reference).norm();
        let ratio = coarse / fine;

        assert!(fine > 0.0);
        assert!(
            ratio > 10.0 && ratio < 24.0,
            "halving the step reduced the error by {} (expected about 16)",
            ratio
        );
    }

    #[test]
    fn test_pendulum_oscillates_about_trim() {
        let (initial, thrust) = pendulum_case();
        let params = PlantParameters::default();
        let mut plant = DynamicsIntegrator::new(params, initial);

        let mut min_pitch = f64::MAX;
        let mut max_pitch = f64::MIN;
        for _ in 0..1000 {
            plant.propagate(thrust).unwrap();
            min_pitch = min_pitch.min(plant.outputs()[1]);
            max_pitch = max_pitch.max(plant.outputs()[1]);
        }

        // Swings from +0.05 to about -0.05 around the -0.3 trim
        assert!(max_pitch <= -0.25 + 1e-6);
        assert!(min_pitch > -0.4 && min_pitch < -0.33);
        assert_eq!(plant.full_state().roll, 0.0);
    }

    #[test]
    fn test_differential_thrust_rolls_right_rotor_up() {
        let params = PlantParameters::default();
        let trim = params.equilibrium_force(0.0);
        let thrust = RotorThrust::new(trim / 2.0 + 0.01, trim / 2.0 - 0.01);

        let state = integrate(params, AttitudeState::default(), thrust, 0.1);

        assert!(state.roll > 0.0);
        assert!(state.roll_rate > 0.0);
    }

    #[test]
    fn test_singular_inertia_is_reported() {
        let params = PlantParameters::default();
        let initial = AttitudeState {
            pitch: std::f64::consts::FRAC_PI_2,
            ..Default::default()
        };
        let mut plant = DynamicsIntegrator::new(params, initial);

        let result = plant.propagate(RotorThrust::default());

        assert!(matches!(
            result,
            Err(WhirlybirdError::SingularInertia { .. })
        ));
        assert_eq!(plant.full_state(), initial);
    }

    #[test]
    fn test_adaptive_solver_matches_rk4() {
        let (initial, thrust) = pendulum_case();
        let params = PlantParameters::default();

        let adaptive = simulate_span(initial, params, thrust, (0.0, 1.0), 1e-9).unwrap();
        let fixed = integrate(params, initial, thrust, 1.0);

        assert_relative_eq!(adaptive.pitch, fixed.pitch, epsilon = 1e-4);
        assert_relative_eq!(adaptive.pitch_rate, fixed.pitch_rate, epsilon = 1e-4);
    }

    #[test]
    fn test_state_array_round_trip_order() {
        let state = AttitudeState::from_array(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(state.pitch, 2.0);
        assert_eq!(state.yaw_rate, 6.0);
        assert_eq!(state.angles(), Vector3::new(1.0, 2.0, 3.0));
    }
}
