use std::sync::atomic::{AtomicBool, Ordering};

use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::config::WhirlybirdConfig;
use crate::control::{ControlStrategy, Measurement};
use crate::driver::ControlLoopDriver;
use crate::dynamics::{AttitudeState, DynamicsIntegrator};
use crate::error::{Result, WhirlybirdError};
use crate::mixer::ForceMixer;
use crate::reference::ReferenceSignal;
use crate::telemetry::TelemetryRecord;

/// What the simulated plant is driven with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantInput {
    /// The controller's force/torque split open-loop into rotor thrust; ignores the mixer's
    /// limits.
    ForceTorque,
    /// The rotor thrust the mixed, saturated command actually produces.
    #[default]
    MixedThrust,
}

/// Zero-mean Gaussian noise added to every sensed angle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Standard deviation (rad).
    pub std_dev: f64,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Simulated time (s).
    pub duration: f64,
    #[serde(default)]
    pub fidelity: PlantInput,
    /// Whether the sensed measurement carries the true rates.
    #[serde(default)]
    pub measure_rates: bool,
    #[serde(default)]
    pub noise: Option<NoiseConfig>,
    #[serde(default)]
    pub reference: ReferenceSignal,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration: 20.0,
            fidelity: PlantInput::MixedThrust,
            measure_rates: false,
            noise: None,
            reference: ReferenceSignal::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(WhirlybirdError::invalid(
                "simulation.duration",
                format!("must be finite and > 0, got {}", self.duration),
            ));
        }
        if let Some(noise) = self.noise {
            if !(noise.std_dev.is_finite() && noise.std_dev >= 0.0) {
                return Err(WhirlybirdError::invalid(
                    "simulation.noise.std_dev",
                    "must be finite and >= 0",
                ));
            }
        }
        self.reference.validate()
    }
}

struct SensorNoise {
    rng: ChaCha8Rng,
    normal: Normal<f64>,
}

impl SensorNoise {
    fn new(config: &NoiseConfig) -> Result<Self> {
        let normal = Normal::new(0.0, config.std_dev)
            .map_err(|e| WhirlybirdError::invalid("simulation.noise.std_dev", e.to_string()))?;
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            normal,
        })
    }

    fn corrupt(&mut self, measurement: &mut Measurement) {
        measurement.roll += self.normal.sample(&mut self.rng);
        measurement.pitch += self.normal.sample(&mut self.rng);
        measurement.yaw += self.normal.sample(&mut self.rng);
    }
}

/// Closed-loop simulation of one rig.
///
/// Each tick reads the reference at the current time, senses the plant, runs the control
/// loop driver and advances the plant by one sample period with the resulting thrust.
pub struct Simulation {
    driver: ControlLoopDriver<ControlStrategy>,
    plant: DynamicsIntegrator,
    config: SimulationConfig,
    noise: Option<SensorNoise>,
    time: f64,
    records: Vec<TelemetryRecord>,
}

impl Simulation {
    /// Validates the configuration and builds the plant, controller, mixer and driver.
    pub fn new(config: &WhirlybirdConfig) -> Result<Self> {
        config.validate()?;

        let controller = ControlStrategy::from_config(
            &config.controller,
            &config.plant,
            &config.initial_state,
        )?;
        let mixer = ForceMixer::new(&config.plant, &config.mixer);
        let noise = config
            .simulation
            .noise
            .as_ref()
            .map(SensorNoise::new)
            .transpose()?;

        info!(
            "simulation: {} controller, {:?} mixing, {:?} plant input, {} s",
            controller.name(),
            mixer.mode(),
            config.simulation.fidelity,
            config.simulation.duration
        );

        Ok(Self {
            driver: ControlLoopDriver::new(controller, mixer, config.driver),
            plant: DynamicsIntegrator::new(config.plant, config.initial_state),
            config: config.simulation,
            noise,
            time: 0.0,
            records: Vec::new(),
        })
    }

    /// Runs one tick and returns its telemetry.
    pub fn step(&mut self) -> Result<TelemetryRecord> {
        let reference = self.config.reference.at(self.time);

        let mut measurement = Measurement::from_state(&self.plant.full_state(), self.config.measure_rates);
        if let Some(noise) = self.noise.as_mut() {
            noise.corrupt(&mut measurement);
        }

        let out = self.driver.tick(&reference, Some(&measurement))?;

        let thrust = match self.config.fidelity {
            PlantInput::ForceTorque => out.force_torque.open_loop_thrust(self.plant.params().d),
            PlantInput::MixedThrust => self.driver.mixer().thrusts(&out.command),
        };
        self.plant.propagate(thrust)?;
        self.time += self.plant.params().sample_period;

        let state = self.plant.full_state();
        let record = TelemetryRecord {
            time: self.time,
            pitch_reference: reference.pitch,
            yaw_reference: reference.yaw,
            roll: state.roll,
            pitch: state.pitch,
            yaw: state.yaw,
            roll_rate: state.roll_rate,
            pitch_rate: state.pitch_rate,
            yaw_rate: state.yaw_rate,
            force: out.force_torque.force,
            torque: out.force_torque.torque,
            left: out.command.left,
            right: out.command.right,
            saturated: out.saturated,
            held: out.held,
        };
        self.records.push(record);
        Ok(record)
    }

    /// Runs up to `steps` ticks, stopping early once `shutdown` is set.
    ///
    /// The flag is checked between ticks only; a tick that has started always completes.
    ///
    /// # Returns
    ///
    /// The number of ticks completed.
    pub fn run(&mut self, steps: usize, shutdown: &AtomicBool) -> Result<usize> {
        for done in 0..steps {
            if shutdown.load(Ordering::Relaxed) {
                info!("shutdown requested after {} ticks", done);
                return Ok(done);
            }
            self.step()?;
        }
        Ok(steps)
    }

    /// Runs the configured duration.
    pub fn run_for_duration(&mut self, shutdown: &AtomicBool) -> Result<usize> {
        let steps = (self.config.duration / self.plant.params().sample_period).round() as usize;
        let done = self.run(steps, shutdown)?;

        let state = self.plant.full_state();
        info!(
            "simulation finished at t = {:.2} s: roll {:.4}, pitch {:.4}, yaw {:.4} rad",
            self.time, state.roll, state.pitch, state.yaw
        );
        Ok(done)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn state(&self) -> AttitudeState {
        self.plant.full_state()
    }

    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    pub fn driver(&self) -> &ControlLoopDriver<ControlStrategy> {
        &self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::pd::{AxisGains, DerivativeSource, PdConfig};
    use crate::control::{ControllerConfig, ObserverConfig, StateFeedbackConfig};
    use crate::gains::tests::{observer_gains, state_feedback_gains};
    use crate::mixer::{MixerConfig, MixingMode};
    use std::f64::consts::PI;

    /// Lab 7: pitch-only PD on measured rate, closed-loop poles at −1 and −3.
    fn pitch_scenario(derivative: DerivativeSource) -> WhirlybirdConfig {
        WhirlybirdConfig {
            initial_state: AttitudeState {
                pitch: -15.0 * PI / 180.0,
                ..Default::default()
            },
            mixer: MixerConfig {
                mode: MixingMode::Thrust,
                max_duty: 1.0,
                saturation_bound: None,
            },
            controller: ControllerConfig::Pd(PdConfig {
                sigma: 0.05,
                windup_rate_threshold: 0.05,
                derivative,
                pitch: AxisGains {
                    kp: 2.605,
                    kd: 3.473,
                    ki: 0.0,
                    limit: Some(1.0),
                },
                yaw: None,
                roll: None,
            }),
            simulation: SimulationConfig {
                duration: 10.0,
                fidelity: PlantInput::ForceTorque,
                measure_rates: derivative == DerivativeSource::Measured,
                noise: None,
                reference: ReferenceSignal::default(),
            },
            ..Default::default()
        }
    }

    fn settle_time(records: &[TelemetryRecord], tolerance: f64) -> Option<f64> {
        let last_outside = records.iter().rposition(|r| r.pitch.abs() >= tolerance);
        match last_outside {
            None => records.first().map(|r| r.time),
            Some(i) => records.get(i + 1).map(|r| r.time),
        }
    }

    #[test]
    fn test_pd_levels_pitch_within_force_limit() {
        for derivative in [DerivativeSource::Measured, DerivativeSource::Filtered] {
            let config = pitch_scenario(derivative);
            let mut sim = Simulation::new(&config).unwrap();
            sim.run_for_duration(&AtomicBool::new(false)).unwrap();

            let trim = config.plant.equilibrium_force(0.0);
            let settled = settle_time(sim.records(), PI / 180.0).expect("pitch never settled");
            assert!(settled < 6.0, "settled at {settled} s");

            // The pitch loop adds at most ±1 N to the trim force, and pitch stays within 20°
            let lowest_trim = config.plant.equilibrium_force(20.0 * PI / 180.0);
            for r in sim.records() {
                assert!(r.force <= trim + 1.0 + 1e-9, "force {} at {} s", r.force, r.time);
                assert!(r.force >= lowest_trim - 1.0 - 1e-9, "force {} at {} s", r.force, r.time);
            }
            assert!(sim.state().pitch.abs() < 0.01);
        }
    }

    #[test]
    fn test_state_feedback_tracks_reference() {
        let config = WhirlybirdConfig {
            controller: ControllerConfig::StateFeedback(StateFeedbackConfig {
                sigma: 0.05,
                gains: state_feedback_gains(),
            }),
            simulation: SimulationConfig {
                duration: 20.0,
                reference: ReferenceSignal::Constant { pitch: 0.1, yaw: 0.2 },
                ..Default::default()
            },
            ..Default::default()
        };
        let mut sim = Simulation::new(&config).unwrap();
        sim.run_for_duration(&AtomicBool::new(false)).unwrap();

        let state = sim.state();
        assert!((state.pitch - 0.1).abs() < 0.01, "pitch {}", state.pitch);
        assert!((state.yaw - 0.2).abs() < 0.01, "yaw {}", state.yaw);
        assert!(state.roll.abs() < 0.01, "roll {}", state.roll);
    }

    #[test]
    fn test_observer_state_feedback_tracks_reference() {
        let config = WhirlybirdConfig {
            controller: ControllerConfig::ObserverStateFeedback(ObserverConfig {
                substeps: 10,
                gains: observer_gains(),
            }),
            simulation: SimulationConfig {
                duration: 20.0,
                reference: ReferenceSignal::Constant { pitch: 0.0, yaw: 0.3 },
                ..Default::default()
            },
            ..Default::default()
        };
        let mut sim = Simulation::new(&config).unwrap();
        sim.run_for_duration(&AtomicBool::new(false)).unwrap();

        let state = sim.state();
        assert!(state.pitch.abs() < 0.01, "pitch {}", state.pitch);
        assert!((state.yaw - 0.3).abs() < 0.01, "yaw {}", state.yaw);
        assert!(state.is_finite());
    }

    #[test]
    fn test_shutdown_stops_between_ticks() {
        let mut sim = Simulation::new(&WhirlybirdConfig::default()).unwrap();
        let shutdown = AtomicBool::new(false);

        assert_eq!(sim.run(5, &shutdown).unwrap(), 5);
        shutdown.store(true, Ordering::Relaxed);
        assert_eq!(sim.run(5, &shutdown).unwrap(), 0);

        assert_eq!(sim.records().len(), 5);
        assert_eq!(sim.driver().ticks(), 5);
    }

    #[test]
    fn test_noise_is_reproducible_from_seed() {
        let mut config = WhirlybirdConfig::default();
        config.simulation.noise = Some(NoiseConfig {
            std_dev: 0.01,
            seed: 7,
        });

        let run = |config: &WhirlybirdConfig| {
            let mut sim = Simulation::new(config).unwrap();
            sim.run(50, &AtomicBool::new(false)).unwrap();
            sim.state()
        };

        assert_eq!(run(&config), run(&config));

        let mut quiet = config.clone();
        quiet.simulation.noise = None;
        assert_ne!(run(&config), run(&quiet));
    }

    #[test]
    fn test_default_config_holds_level() {
        let mut sim = Simulation::new(&WhirlybirdConfig::default()).unwrap();
        sim.run(200, &AtomicBool::new(false)).unwrap();

        let state = sim.state();
        assert!(state.pitch.abs() < 1e-6);
        assert!(state.roll.abs() < 1e-9);
        assert!(state.yaw.abs() < 1e-9);
    }
}
