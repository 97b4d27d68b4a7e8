use log::warn;
use serde::{Deserialize, Serialize};

use crate::dynamics::RotorThrust;
use crate::error::{Result, WhirlybirdError};
use crate::params::PlantParameters;

/// Raw controller output before allocation to the rotors.
///
/// # Fields
///
/// * `force` - Total vertical rotor force F (N)
/// * `torque` - Roll torque τ from differential thrust (N⋅m)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ForceTorque {
    pub force: f64,
    pub torque: f64,
}

impl ForceTorque {
    pub fn new(force: f64, torque: f64) -> Self {
        Self { force, torque }
    }

    /// Splits the command into rotor thrust without any motor model or limits.
    pub fn open_loop_thrust(&self, d: f64) -> RotorThrust {
        RotorThrust::new(
            self.force / 2.0 + self.torque / (2.0 * d),
            self.force / 2.0 - self.torque / (2.0 * d),
        )
    }
}

/// Left/right rotor command emitted to the rig.
///
/// In PWM mode these are duty cycles in `[0, max_duty]`; in thrust mode they are rotor
/// forces in newtons.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub left: f64,
    pub right: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixingMode {
    /// Open-loop split into thrust (N), never clamped.
    Thrust,
    /// Duty cycles through the motor gain, clamped to the duty range.
    Pwm,
}

/// Actuator allocation settings.
///
/// # Fields
///
/// * `mode` - Thrust or PWM allocation
/// * `max_duty` - Upper clamp for each PWM duty
/// * `saturation_bound` - Upper bound used for the saturation flag; defaults to `max_duty`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MixerConfig {
    pub mode: MixingMode,
    pub max_duty: f64,
    #[serde(default)]
    pub saturation_bound: Option<f64>,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            mode: MixingMode::Pwm,
            max_duty: 0.6,
            saturation_bound: None,
        }
    }
}

impl MixerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_duty > 0.0 && self.max_duty <= 1.0) {
            return Err(WhirlybirdError::invalid(
                "mixer.max_duty",
                format!("must be in (0, 1], got {}", self.max_duty),
            ));
        }
        if let Some(bound) = self.saturation_bound {
            if !(bound > 0.0 && bound <= 1.0) {
                return Err(WhirlybirdError::invalid(
                    "mixer.saturation_bound",
                    format!("must be in (0, 1], got {bound}"),
                ));
            }
        }
        Ok(())
    }
}

/// Result of one allocation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixOutput {
    pub command: ActuatorCommand,
    /// Either raw rotor command fell outside `[0, saturation_bound]`.
    pub saturated: bool,
}

/// Converts force/torque commands into rotor commands.
///
/// The two rotors sit `d` either side of the boom axis, so
///
/// left  = (F + τ/d) / 2
/// right = (F − τ/d) / 2
///
/// In PWM mode both are divided by the motor gain km and clamped to `[0, max_duty]`.
pub struct ForceMixer {
    mode: MixingMode,
    d: f64,
    motor_gain: f64,
    max_duty: f64,
    saturation_bound: f64,
    was_saturated: bool,
}

impl ForceMixer {
    pub fn new(params: &PlantParameters, config: &MixerConfig) -> Self {
        Self {
            mode: config.mode,
            d: params.d,
            motor_gain: params.motor_gain(),
            max_duty: config.max_duty,
            saturation_bound: config.saturation_bound.unwrap_or(config.max_duty),
            was_saturated: false,
        }
    }

    pub fn mode(&self) -> MixingMode {
        self.mode
    }

    /// Allocates a force/torque command to the rotors.
    ///
    /// # Arguments
    ///
    /// * `input` - Controller output (F, τ)
    ///
    /// # Returns
    ///
    /// The rotor command and whether it had to be saturated. Saturation is never an error;
    /// the flag is fed back to the controllers on the next tick.
    pub fn mix(&mut self, input: ForceTorque) -> MixOutput {
        let raw = input.open_loop_thrust(self.d);

        let output = match self.mode {
            MixingMode::Thrust => MixOutput {
                command: ActuatorCommand {
                    left: raw.left,
                    right: raw.right,
                },
                saturated: false,
            },
            MixingMode::Pwm => {
                let left = raw.left / self.motor_gain;
                let right = raw.right / self.motor_gain;
                let outside = |u: f64| u < 0.0 || u > self.saturation_bound;

                MixOutput {
                    command: ActuatorCommand {
                        left: left.clamp(0.0, self.max_duty),
                        right: right.clamp(0.0, self.max_duty),
                    },
                    saturated: outside(left) || outside(right),
                }
            }
        };

        if output.saturated && !self.was_saturated {
            warn!(
                "actuator saturated: F = {:.3} N, tau = {:.4} N*m",
                input.force, input.torque
            );
        }
        self.was_saturated = output.saturated;

        output
    }

    /// Rotor thrust (N) that a command produces on the rig.
    pub fn thrusts(&self, command: &ActuatorCommand) -> RotorThrust {
        match self.mode {
            MixingMode::Thrust => RotorThrust::new(command.left, command.right),
            MixingMode::Pwm => RotorThrust::new(
                command.left * self.motor_gain,
                command.right * self.motor_gain,
            ),
        }
    }

    /// Inverse allocation: the force/torque a command actually produces.
    pub fn unmix(&self, command: &ActuatorCommand) -> ForceTorque {
        let thrust = self.thrusts(command);
        ForceTorque::new(
            thrust.left + thrust.right,
            self.d * (thrust.left - thrust.right),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn pwm_mixer(saturation_bound: Option<f64>) -> ForceMixer {
        ForceMixer::new(
            &PlantParameters::default(),
            &MixerConfig {
                mode: MixingMode::Pwm,
                max_duty: 0.6,
                saturation_bound,
            },
        )
    }

    proptest! {
        #[test]
        fn test_unmix_inverts_mix_off_saturation(force in 0.5f64..6.0, torque in -0.05f64..0.05) {
            let mut mixer = pwm_mixer(None);
            let out = mixer.mix(ForceTorque::new(force, torque));
            prop_assume!(!out.saturated);

            let back = mixer.unmix(&out.command);
            prop_assert!((back.force - force).abs() < 1e-9);
            prop_assert!((back.torque - torque).abs() < 1e-9);
        }

        #[test]
        fn test_thrust_mode_is_invertible(force in -10.0f64..10.0, torque in -1.0f64..1.0) {
            let mut mixer = ForceMixer::new(
                &PlantParameters::default(),
                &MixerConfig { mode: MixingMode::Thrust, max_duty: 1.0, saturation_bound: None },
            );
            let out = mixer.mix(ForceTorque::new(force, torque));
            prop_assert!(!out.saturated);

            let back = mixer.unmix(&out.command);
            prop_assert!((back.force - force).abs() < 1e-9);
            prop_assert!((back.torque - torque).abs() < 1e-9);
        }

        #[test]
        fn test_pwm_output_always_in_range(force in -20.0f64..20.0, torque in -2.0f64..2.0) {
            let mut mixer = pwm_mixer(None);
            let out = mixer.mix(ForceTorque::new(force, torque));
            prop_assert!(out.command.left >= 0.0 && out.command.left <= 0.6);
            prop_assert!(out.command.right >= 0.0 && out.command.right <= 0.6);
        }
    }

    #[test]
    fn test_equilibrium_force_maps_to_equilibrium_duty() {
        let params = PlantParameters::default();
        let mut mixer = pwm_mixer(None);

        let out = mixer.mix(ForceTorque::new(params.equilibrium_force(0.0), 0.0));

        assert_relative_eq!(out.command.left, params.equilibrium_duty, epsilon = 1e-12);
        assert_relative_eq!(out.command.right, params.equilibrium_duty, epsilon = 1e-12);
        assert!(!out.saturated);
    }

    #[test]
    fn test_saturation_clamps_and_flags() {
        let mut mixer = pwm_mixer(None);

        let high = mixer.mix(ForceTorque::new(20.0, 0.0));
        assert_eq!(high.command.left, 0.6);
        assert_eq!(high.command.right, 0.6);
        assert!(high.saturated);

        let negative = mixer.mix(ForceTorque::new(-1.0, 0.0));
        assert_eq!(negative.command.left, 0.0);
        assert!(negative.saturated);

        let one_sided = mixer.mix(ForceTorque::new(5.0, 0.5));
        assert_eq!(one_sided.command.left, 0.6);
        assert!(one_sided.command.right > 0.0 && one_sided.command.right < 0.6);
        assert!(one_sided.saturated);
    }

    #[test]
    fn test_wider_flag_bound_clamps_without_flagging() {
        let params = PlantParameters::default();
        let mut mixer = pwm_mixer(Some(1.0));
        // 0.8 duty per rotor: above the clamp, below the flag bound
        let force = 2.0 * 0.8 * params.motor_gain();

        let out = mixer.mix(ForceTorque::new(force, 0.0));

        assert_eq!(out.command.left, 0.6);
        assert_eq!(out.command.right, 0.6);
        assert!(!out.saturated);
    }

    #[test]
    fn test_config_validation() {
        let mut config = MixerConfig::default();
        assert!(config.validate().is_ok());
        config.max_duty = 1.5;
        assert!(config.validate().is_err());
        config.max_duty = 0.6;
        config.saturation_bound = Some(0.0);
        assert!(config.validate().is_err());
    }
}
