use serde::{Deserialize, Serialize};

use crate::error::{Result, WhirlybirdError};

/// Physical constants of the whirlybird rig.
///
/// The rig is a boom pivoting on a gimbal: the rotor head of mass `m1` sits at distance `l1`
/// from the pivot, a counterweight of mass `m2` at distance `l2` on the other side. The two
/// rotors are `d` apart from the boom axis.
///
/// # Fields
///
/// * `l1`, `l2` - Pivot to rotor head / pivot to counterweight (m)
/// * `m1`, `m2` - Rotor head / counterweight mass (kg)
/// * `d` - Distance from the boom axis to each rotor (m)
/// * `jx`, `jy`, `jz` - Principal inertia of the rotor head (kg⋅m²)
/// * `g` - Gravitational acceleration (m/s²)
/// * `sample_period` - Control and integration period Ts (s)
/// * `equilibrium_duty` - PWM duty per rotor that holds the boom level
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlantParameters {
    pub l1: f64,
    pub l2: f64,
    pub m1: f64,
    pub m2: f64,
    pub d: f64,
    pub jx: f64,
    pub jy: f64,
    pub jz: f64,
    pub g: f64,
    pub sample_period: f64,
    pub equilibrium_duty: f64,
}

impl Default for PlantParameters {
    fn default() -> Self {
        Self {
            l1: 0.85,
            l2: 0.3048,
            m1: 0.891,
            m2: 1.0,
            d: 0.178,
            jx: 0.0047,
            jy: 0.0014,
            jz: 0.0041,
            g: 9.8,
            sample_period: 0.01,
            equilibrium_duty: 0.46,
        }
    }
}

impl PlantParameters {
    /// Rotor force per unit PWM duty (N).
    ///
    /// Chosen so that both rotors at `equilibrium_duty` exactly balance the boom at zero
    /// pitch.
    pub fn motor_gain(&self) -> f64 {
        (self.m1 * self.l1 * self.g - self.m2 * self.l2 * self.g)
            / (self.l1 * 2.0 * self.equilibrium_duty)
    }

    /// Total rotor force that cancels gravity at pitch `theta`.
    pub fn equilibrium_force(&self, theta: f64) -> f64 {
        (self.m1 * self.l1 - self.m2 * self.l2) * self.g / self.l1 * theta.cos()
    }

    /// Net gravity torque coefficient `(m1 l1 - m2 l2) g`.
    pub fn gravity_moment(&self) -> f64 {
        (self.m1 * self.l1 - self.m2 * self.l2) * self.g
    }

    /// Moment of inertia of the point masses about the pivot, `m1 l1² + m2 l2²`.
    pub fn boom_inertia(&self) -> f64 {
        self.m1 * self.l1 * self.l1 + self.m2 * self.l2 * self.l2
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("plant.l1", self.l1),
            ("plant.l2", self.l2),
            ("plant.m1", self.m1),
            ("plant.m2", self.m2),
            ("plant.d", self.d),
            ("plant.jx", self.jx),
            ("plant.jy", self.jy),
            ("plant.jz", self.jz),
            ("plant.g", self.g),
            ("plant.sample_period", self.sample_period),
            ("plant.equilibrium_duty", self.equilibrium_duty),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(WhirlybirdError::invalid(
                    field,
                    format!("must be finite and > 0, got {value}"),
                ));
            }
        }
        if self.equilibrium_duty > 1.0 {
            return Err(WhirlybirdError::invalid(
                "plant.equilibrium_duty",
                "must not exceed 1.0",
            ));
        }
        if self.motor_gain() <= 0.0 {
            return Err(WhirlybirdError::invalid(
                "plant",
                "rotor head must outweigh the counterweight (m1 l1 > m2 l2)",
            ));
        }
        Ok(())
    }
}
