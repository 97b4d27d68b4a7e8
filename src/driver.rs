use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::control::{AttitudeController, ControlStrategy, Measurement, Reference};
use crate::error::{Result, WhirlybirdError};
use crate::mixer::{ActuatorCommand, ForceMixer, ForceTorque};

fn default_max_misses() -> u32 {
    5
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Missed measurements tolerated in a row before control authority is declared lost.
    #[serde(default = "default_max_misses")]
    pub max_consecutive_misses: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_consecutive_misses: default_max_misses(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    /// No tick has run yet.
    Idle,
    Running,
}

/// Everything one tick emitted.
///
/// # Fields
///
/// * `command` - Rotor command sent to the rig
/// * `force_torque` - Controller output before mixing
/// * `saturated` - Whether the mixer clamped the command
/// * `held` - The measurement was missing and the previous command was repeated
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickOutput {
    pub command: ActuatorCommand,
    pub force_torque: ForceTorque,
    pub saturated: bool,
    pub held: bool,
}

/// Runs one controller and the mixer at the sample rate.
///
/// Each tick goes measurement → controller → mixer → command, in that order, with the
/// saturation flag of one tick handed to the controller on the next. The driver does not
/// pace itself; the caller supplies one tick per sample period.
pub struct ControlLoopDriver<C = ControlStrategy> {
    controller: C,
    mixer: ForceMixer,
    config: DriverConfig,
    state: DriverState,
    last: TickOutput,
    consecutive_misses: u32,
    ticks: u64,
}

impl<C: AttitudeController> ControlLoopDriver<C> {
    /// Creates an idle driver. Until the first command is computed the held command is
    /// zero duty on both rotors.
    pub fn new(controller: C, mixer: ForceMixer, config: DriverConfig) -> Self {
        Self {
            controller,
            mixer,
            config,
            state: DriverState::Idle,
            last: TickOutput::default(),
            consecutive_misses: 0,
            ticks: 0,
        }
    }

    /// Runs one sample period.
    ///
    /// # Arguments
    ///
    /// * `reference` - Commanded pitch and yaw for this tick
    /// * `measurement` - Sensed attitude, or `None` if it did not arrive in time
    ///
    /// # Returns
    ///
    /// * `Ok(TickOutput)` - The command to emit; on a miss, the previous one with `held` set
    /// * `Err(WhirlybirdError::ControlAuthorityLost)` - More than `max_consecutive_misses`
    ///   measurements in a row were missing
    pub fn tick(&mut self, reference: &Reference, measurement: Option<&Measurement>) -> Result<TickOutput> {
        if self.state == DriverState::Idle {
            info!("control loop running");
            self.state = DriverState::Running;
        }
        self.ticks += 1;

        let Some(measurement) = measurement else {
            self.consecutive_misses += 1;
            if self.consecutive_misses > self.config.max_consecutive_misses {
                error!(
                    "no measurement for {} ticks, giving up",
                    self.consecutive_misses
                );
                return Err(WhirlybirdError::ControlAuthorityLost {
                    missed: self.consecutive_misses,
                });
            }
            warn!(
                "tick {}: measurement missing ({} in a row), holding last command",
                self.ticks, self.consecutive_misses
            );
            return Ok(TickOutput {
                held: true,
                ..self.last
            });
        };
        self.consecutive_misses = 0;

        let force_torque = self
            .controller
            .update(reference, measurement, self.last.saturated);
        let mixed = self.mixer.mix(force_torque);

        self.last = TickOutput {
            command: mixed.command,
            force_torque,
            saturated: mixed.saturated,
            held: false,
        };
        Ok(self.last)
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn mixer(&self) -> &ForceMixer {
        &self.mixer
    }
}
